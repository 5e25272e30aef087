//! Shared engine of the broadcast-style transports.
//!
//! Broadcast channels have no native reply path, so a call is emulated:
//!
//! 1. Attach a one-shot listener for `RESPONSE` envelopes
//! 2. Broadcast a `REQUEST` envelope
//! 3. Resolve with the first `RESPONSE` whose namespace matches, whose
//!    instance ID is not our own, and whose message type equals ours
//!
//! Matching is by message type, not ID. Two concurrent calls of the same type
//! from one sender may both resolve with the same response. A call that
//! nobody answers stays pending until the messenger is closed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::host::ListenerKey;
use crate::identifiers::InstanceId;
use crate::messaging::{Dispatch, Subscription, Transport};
use crate::protocol::{Message, NamespaceEnvelope, ResponseWrapper};

// ============================================================================
// BroadcastChannel
// ============================================================================

/// Which half of a call a broadcast carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `REQUEST` envelopes.
    Request,
    /// `RESPONSE` envelopes.
    Response,
}

/// Listener for raw broadcast payloads.
pub type BroadcastListener = Arc<dyn Fn(Value) + Send + Sync>;

/// Shared medium under a [`NamespaceTransport`].
pub trait BroadcastChannel: Send + Sync + 'static {
    /// Extra addressing accepted per send.
    type Target: Send + 'static;

    /// Origin recorded in outgoing requests so replies can be addressed.
    fn sender_origin(&self) -> Option<String>;

    /// Origin a request is restricted to.
    fn target_origin(target: &Self::Target) -> Option<&str>;

    /// Broadcasts a payload.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the payload cannot be broadcast.
    fn publish(&self, direction: Direction, data: Value, origin: Option<&str>) -> Result<()>;

    /// Attaches a listener for payloads of one direction.
    ///
    /// Channels without separate event names may deliver both.
    fn listen(&self, direction: Direction, listener: BroadcastListener) -> ListenerKey;

    /// Detaches a listener.
    fn unlisten(&self, key: ListenerKey);
}

// ============================================================================
// NamespaceTransport
// ============================================================================

/// [`Transport`] over a [`BroadcastChannel`] partitioned by namespace.
pub struct NamespaceTransport<C: BroadcastChannel> {
    channel: Arc<C>,
    namespace: String,
    instance_id: InstanceId,
    pending: Mutex<FxHashSet<ListenerKey>>,
}

impl<C: BroadcastChannel> NamespaceTransport<C> {
    /// Creates a transport with a fresh instance ID.
    #[must_use]
    pub fn new(channel: C, namespace: impl Into<String>) -> Self {
        Self {
            channel: Arc::new(channel),
            namespace: namespace.into(),
            instance_id: InstanceId::generate(),
            pending: Mutex::new(FxHashSet::default()),
        }
    }

    /// Returns the namespace.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns this instance's identity.
    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Returns the channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Number of calls waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

}

#[async_trait]
impl<C: BroadcastChannel> Transport for NamespaceTransport<C> {
    type Target = C::Target;

    async fn send(&self, message: Message, target: C::Target) -> Result<Option<ResponseWrapper>> {
        let request_type = message.message_type.clone();
        let request = NamespaceEnvelope::Request {
            namespace: self.namespace.clone(),
            instance_id: self.instance_id.clone(),
            message: message.to_wire()?,
            sender_origin: self.channel.sender_origin(),
        };
        let data = serde_json::to_value(&request)?;

        let (response_tx, response_rx) = oneshot::channel();
        let response_tx = Mutex::new(Some(response_tx));
        let namespace = self.namespace.clone();
        let own = self.instance_id.clone();

        let listener: BroadcastListener = Arc::new(move |data| {
            let Some(envelope) = NamespaceEnvelope::decode(&data) else {
                return;
            };
            if !envelope.is_peer_of(&namespace, &own)
                || envelope.message_type() != Some(request_type.as_str())
            {
                return;
            }
            if let NamespaceEnvelope::Response { response, .. } = envelope
                && let Some(tx) = response_tx.lock().take()
            {
                let _ = tx.send(response);
            }
        });

        // Listen before publishing; some channels deliver synchronously.
        let key = self.channel.listen(Direction::Response, listener);
        let _pending = PendingCall::new(self, key);

        self.channel
            .publish(Direction::Request, data, C::target_origin(&target))?;

        trace!(id = %message.id, message_type = %message.message_type, "Request broadcast");

        response_rx.await.map_err(|_| Error::Closed)
    }

    fn add_root_listener(&self, dispatch: Dispatch) -> Result<Subscription> {
        // Hosts may deliver events on their own threads.
        let runtime = Handle::try_current().ok();
        let channel = Arc::clone(&self.channel);
        let namespace = self.namespace.clone();
        let own = self.instance_id.clone();

        let listener: BroadcastListener = Arc::new(move |data| {
            let Some(NamespaceEnvelope::Request {
                namespace: request_namespace,
                instance_id,
                message,
                sender_origin,
            }) = NamespaceEnvelope::decode(&data)
            else {
                return;
            };
            if request_namespace != namespace || instance_id == own {
                return;
            }

            let Some(runtime) = runtime.clone().or_else(|| Handle::try_current().ok()) else {
                warn!(namespace = %namespace, "No tokio runtime to answer broadcast request");
                return;
            };

            let reply = dispatch(message.clone());
            let channel = Arc::clone(&channel);
            let responder = Responder {
                namespace: namespace.clone(),
                instance_id: own.clone(),
                message,
                reply_to: sender_origin,
            };

            runtime.spawn(async move {
                match reply.await {
                    Ok(Some(response)) => responder.publish(&*channel, response),
                    Ok(None) => trace!("No handler for broadcast request, staying silent"),
                    Err(err) => debug!(error = %err, "Broadcast request rejected"),
                }
            });
        });

        let key = self.channel.listen(Direction::Request, listener);
        let channel = Arc::clone(&self.channel);
        Ok(Subscription::new(move || channel.unlisten(key)))
    }

    fn cancel_pending(&self) {
        let keys: Vec<_> = self.pending.lock().drain().collect();
        if !keys.is_empty() {
            debug!(count = keys.len(), "Abandoning pending broadcast calls");
        }
        for key in keys {
            self.channel.unlisten(key);
        }
    }
}

// ============================================================================
// PendingCall
// ============================================================================

/// Response listener of one in-flight call.
///
/// Detached when the call resolves, fails or is dropped.
struct PendingCall<'a, C: BroadcastChannel> {
    transport: &'a NamespaceTransport<C>,
    key: ListenerKey,
}

impl<'a, C: BroadcastChannel> PendingCall<'a, C> {
    fn new(transport: &'a NamespaceTransport<C>, key: ListenerKey) -> Self {
        transport.pending.lock().insert(key);
        Self { transport, key }
    }
}

impl<C: BroadcastChannel> Drop for PendingCall<'_, C> {
    fn drop(&mut self) {
        self.transport.pending.lock().remove(&self.key);
        self.transport.channel.unlisten(self.key);
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Everything needed to answer one broadcast request.
struct Responder {
    namespace: String,
    instance_id: InstanceId,
    message: Value,
    reply_to: Option<String>,
}

impl Responder {
    fn encode(&self, response: ResponseWrapper) -> Result<Value> {
        let envelope = NamespaceEnvelope::Response {
            namespace: self.namespace.clone(),
            instance_id: self.instance_id.clone(),
            message: self.message.clone(),
            response: Some(response),
        };
        Ok(serde_json::to_value(&envelope)?)
    }

    /// Publishes the response; if the host refuses it, publishes the host's
    /// error text as an `err` response instead.
    fn publish<C: BroadcastChannel>(&self, channel: &C, response: ResponseWrapper) {
        let reply_to = self.reply_to.as_deref();
        let outcome = self
            .encode(response)
            .and_then(|data| channel.publish(Direction::Response, data, reply_to));

        let Err(err) = outcome else {
            return;
        };
        warn!(error = %err, "Response could not be published, reporting error instead");

        let fallback = self
            .encode(ResponseWrapper::Err(err.to_string()))
            .and_then(|data| channel.publish(Direction::Response, data, reply_to));
        if let Err(err) = fallback {
            warn!(error = %err, "Error response could not be published");
        }
    }
}
