//! Service registration and lookup across contexts.
//!
//! One context (the background by default) registers the real object; every
//! other context gets a stand-in that turns each call into one message of
//! type `proxy-service.<name>` carrying `{path, args}`.
//!
//! ```ignore
//! let math = ProxyService::define("math", messenger, Arc::new(ExtensionContext::Background));
//! math.register_service(|| ServiceObject::new().method("add", |(a, b): (i64, i64)| async move {
//!     Ok::<_, String>(a + b)
//! }))?;
//!
//! // in a content script, with a detector reporting ContentScript
//! let sum: i64 = math.get_service()?.get("add").call_as(vec![json!(1), json!(2)]).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::ContextDetector;
use crate::error::{Error, Result};
use crate::messaging::{ListenerHandle, Messenger, Transport};
use crate::protocol::Message;

use super::service::ServiceObject;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every service message type.
const MESSAGE_TYPE_PREFIX: &str = "proxy-service";

// ============================================================================
// ProxyCall
// ============================================================================

/// Payload of one proxied call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProxyCall {
    /// Dotted member path; absent for the object itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

// ============================================================================
// ServiceCaller
// ============================================================================

/// Executes calls addressed to a service.
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    /// Performs the call.
    async fn call(&self, call: ProxyCall) -> Result<Value>;

    /// Returns `true` if calls leave the current context.
    fn is_proxy(&self) -> bool;
}

#[async_trait]
impl ServiceCaller for ServiceObject {
    async fn call(&self, call: ProxyCall) -> Result<Value> {
        self.invoke(call.path.as_deref(), call.args)
            .await
            .map_err(Error::remote)
    }

    fn is_proxy(&self) -> bool {
        false
    }
}

/// Sends calls through a messenger to the real context.
struct MessengerCaller<T: Transport> {
    messenger: Messenger<T>,
    message_type: String,
    target: T::Target,
}

#[async_trait]
impl<T> ServiceCaller for MessengerCaller<T>
where
    T: Transport,
    T::Target: Clone + Sync,
{
    async fn call(&self, call: ProxyCall) -> Result<Value> {
        self.messenger
            .send_message(&self.message_type, call, self.target.clone())
            .await
    }

    fn is_proxy(&self) -> bool {
        true
    }
}

// ============================================================================
// ServiceRef
// ============================================================================

/// Handle to a service or one of its members.
///
/// [`ServiceRef::get`] walks into members without any communication; only
/// [`ServiceRef::call`] does work, either in place (real context) or as one
/// message (any other context).
#[derive(Clone)]
pub struct ServiceRef {
    caller: Arc<dyn ServiceCaller>,
    path: Option<String>,
}

impl ServiceRef {
    /// Wraps a caller at the service root.
    #[must_use]
    pub fn new(caller: Arc<dyn ServiceCaller>) -> Self {
        Self { caller, path: None }
    }

    /// Returns a handle to member `property`.
    #[must_use]
    pub fn get(&self, property: &str) -> Self {
        let path = match &self.path {
            Some(parent) => format!("{parent}.{property}"),
            None => property.to_string(),
        };

        Self {
            caller: Arc::clone(&self.caller),
            path: Some(path),
        }
    }

    /// Dotted path of this handle; `None` at the root.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Calls the member with positional arguments.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] with the method's error text
    /// - any messaging error when called through a proxy
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let call = ProxyCall {
            path: self.path.clone(),
            args,
        };
        self.caller.call(call).await
    }

    /// Calls the member and decodes its result.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceRef::call`], plus [`Error::Json`] if the result does
    /// not decode into `R`.
    pub async fn call_as<R: DeserializeOwned>(&self, args: Vec<Value>) -> Result<R> {
        let value = self.call(args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns `true` for stand-ins whose calls go to another context.
    #[inline]
    #[must_use]
    pub fn is_proxy_object(&self) -> bool {
        self.caller.is_proxy()
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("path", &self.path)
            .field("proxy", &self.is_proxy_object())
            .finish()
    }
}

/// Returns `true` if `service` is a stand-in for a service in another context.
#[inline]
#[must_use]
pub fn is_proxy_object(service: &ServiceRef) -> bool {
    service.is_proxy_object()
}

/// Serializes one argument for a proxied call.
///
/// # Errors
///
/// Returns [`Error::Json`] if the value cannot be serialized.
pub fn encode_arg<A: Serialize + ?Sized>(arg: &A) -> Result<Value> {
    Ok(serde_json::to_value(arg)?)
}

// ============================================================================
// ProxyService
// ============================================================================

/// Named service shared between contexts over one messenger.
pub struct ProxyService<T: Transport> {
    name: String,
    message_type: String,
    messenger: Messenger<T>,
    detector: Arc<dyn ContextDetector>,
    registered: Mutex<Option<Registered<T>>>,
}

struct Registered<T: Transport> {
    service: Arc<ServiceObject>,
    handle: ListenerHandle<T>,
}

impl<T> ProxyService<T>
where
    T: Transport,
    T::Target: Clone + Sync,
{
    /// Defines the service `name` on `messenger`.
    #[must_use]
    pub fn define(
        name: impl Into<String>,
        messenger: Messenger<T>,
        detector: Arc<dyn ContextDetector>,
    ) -> Self {
        let name = name.into();
        Self {
            message_type: format!("{MESSAGE_TYPE_PREFIX}.{name}"),
            name,
            messenger,
            detector,
            registered: Mutex::new(None),
        }
    }

    /// Returns the service name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the message type carrying this service's calls.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Builds the real object and starts answering calls for it.
    ///
    /// The factory only runs once the service is known to be unregistered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateListener`] if the service is already
    /// registered on this messenger.
    pub fn register_service<F>(&self, factory: F) -> Result<Arc<ServiceObject>>
    where
        F: FnOnce() -> ServiceObject,
    {
        let mut registered = self.registered.lock();
        if registered.is_some() || self.messenger.has_listener(&self.message_type) {
            return Err(Error::duplicate_listener(&self.message_type));
        }

        let service = Arc::new(factory());

        let target = Arc::clone(&service);
        let handle = self
            .messenger
            .on_message(self.message_type.clone(), move |message: Message| {
                let service = Arc::clone(&target);
                async move {
                    let call: ProxyCall = message.data_as().map_err(|e| e.to_string())?;
                    service.invoke(call.path.as_deref(), call.args).await
                }
            })?;

        debug!(service = %self.name, paths = ?service.paths(), "Service registered");

        *registered = Some(Registered {
            service: Arc::clone(&service),
            handle,
        });
        Ok(service)
    }

    /// Stops answering calls; returns `false` if nothing was registered.
    pub fn unregister_service(&self) -> bool {
        let Some(registered) = self.registered.lock().take() else {
            return false;
        };
        debug!(service = %self.name, "Service unregistered");
        registered.handle.remove()
    }

    /// Returns the service for the current context, using the default target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceNotRegistered`] in the real context if
    /// [`ProxyService::register_service`] was never called.
    pub fn get_service(&self) -> Result<ServiceRef>
    where
        T::Target: Default,
    {
        self.get_service_with_target(T::Target::default())
    }

    /// Returns the service for the current context.
    ///
    /// In the real context this is the registered object itself; anywhere
    /// else it is a stand-in sending calls to `target`.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyService::get_service`].
    pub fn get_service_with_target(&self, target: T::Target) -> Result<ServiceRef> {
        if self.detector.is_real_context() {
            let registered = self.registered.lock();
            let service = registered
                .as_ref()
                .ok_or_else(|| Error::service_not_registered(&self.name))?;
            return Ok(ServiceRef::new(
                Arc::clone(&service.service) as Arc<dyn ServiceCaller>
            ));
        }

        Ok(ServiceRef::new(Arc::new(MessengerCaller {
            messenger: self.messenger.clone(),
            message_type: self.message_type.clone(),
            target,
        })))
    }
}

// ============================================================================
// Tests
// ============================================================================
