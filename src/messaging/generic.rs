//! Transport-agnostic request/response engine.
//!
//! Turns "fire a message, get exactly one matching reply" into a call that
//! resolves to the handler's value or fails with its error.
//!
//! # Flow
//!
//! ```text
//! send_message(type, data)                       root listener
//!   │ build {id, type, data, timestamp}            │ validate envelope
//!   │ Transport::send ───────── wire ────────────► │ look up handler by type
//!   │                                              │ invoke, wrap {res} / {err}
//!   │ ◄──────────────────────── wire ───────────── │
//!   └ unwrap: res → Ok, err → Error::Remote, nothing → Error::NoResponse
//! ```
//!
//! One root listener per messenger multiplexes every per-type handler. It is
//! attached with the first handler and detached with the last.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::result::Result as StdResult;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, MessageIdGenerator};
use crate::protocol::{Incoming, Message, ProtocolMessage, ResponseWrapper};

use super::config::MessengerConfig;
use super::registry::{Handler, ListenerRegistry};

// ============================================================================
// Transport Contract
// ============================================================================

/// Entry point a transport calls for every inbound raw message.
///
/// Resolves to:
/// - `Ok(Some(wrapper))` - a handler ran; send `wrapper` back
/// - `Ok(None)` - no handler for this type here; send nothing
/// - `Err(_)` - malformed envelope; local error, nothing is sent
pub type Dispatch =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Option<ResponseWrapper>>> + Send + Sync>;

/// Native subscription owned by the engine.
pub struct Subscription {
    remove: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    /// Wraps the teardown of a native subscription.
    #[must_use]
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Box::new(remove),
        }
    }

    /// Tears the native subscription down.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

/// Delivery strategy plugged into a [`Messenger`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Extra addressing accepted by `send_message`.
    type Target: Send + 'static;

    /// Delivers an envelope and waits for the raw response.
    ///
    /// `Ok(None)` means the transport got an answer but nobody handled the
    /// message.
    async fn send(&self, message: Message, target: Self::Target)
    -> Result<Option<ResponseWrapper>>;

    /// Subscribes `dispatch` to the native inbound event source.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the subscription.
    fn add_root_listener(&self, dispatch: Dispatch) -> Result<Subscription>;

    /// Abandons calls still waiting for a response.
    fn cancel_pending(&self) {}
}

// ============================================================================
// Messenger
// ============================================================================

/// Request/response messenger over a [`Transport`].
///
/// Cheap to clone; clones share the listener table and root listener.
pub struct Messenger<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Transport> {
    transport: T,
    config: MessengerConfig,
    ids: MessageIdGenerator,
    state: Mutex<ListenerState>,
}

#[derive(Default)]
struct ListenerState {
    registry: ListenerRegistry,
    root: Option<Subscription>,
}

impl<T: Transport> Clone for Messenger<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ============================================================================
// Messenger - Constructor & Accessors
// ============================================================================

impl<T: Transport> Messenger<T> {
    /// Creates a messenger. Nothing is subscribed until the first handler.
    #[must_use]
    pub fn new(transport: T, config: MessengerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                ids: MessageIdGenerator::new(),
                state: Mutex::new(ListenerState::default()),
            }),
        }
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MessengerConfig {
        &self.inner.config
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Returns `true` if `message_type` has a handler.
    #[must_use]
    pub fn has_listener(&self, message_type: &str) -> bool {
        self.inner.state.lock().registry.get(message_type).is_some()
    }

    /// Returns `true` while the root listener is subscribed.
    #[must_use]
    pub fn has_root_listener(&self) -> bool {
        self.inner.state.lock().root.is_some()
    }
}

// ============================================================================
// Messenger - Sending
// ============================================================================

impl<T: Transport> Messenger<T> {
    /// Sends `data` as a message of `message_type` and waits for the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `data` cannot be serialized
    /// - [`Error::Remote`] with the handler's message if the handler failed
    /// - [`Error::NoResponse`] if nobody handled the message
    /// - any transport error (e.g. [`Error::NoReceiver`]) unchanged
    pub async fn send_message<D: Serialize>(
        &self,
        message_type: &str,
        data: D,
        target: T::Target,
    ) -> Result<Value> {
        let data = serde_json::to_value(data)?;
        let message = Message::new(self.inner.ids.next_id(), message_type, data);
        let id = message.id;

        if let Some(logger) = &self.inner.config.logger {
            logger.debug(format_args!(
                "[messaging] send_message {{id={id}}} ─ᐅ {message_type}: {}",
                message.data
            ));
        }

        let response = self.inner.transport.send(message, target).await?;

        if let Some(logger) = &self.inner.config.logger {
            logger.debug(format_args!(
                "[messaging] send_message {{id={id}}} ᐊ─ {response:?}"
            ));
        }

        response.ok_or(Error::NoResponse)?.into_result()
    }

    /// Sends a typed protocol message.
    ///
    /// # Errors
    ///
    /// Same as [`Messenger::send_message`], plus [`Error::Json`] if the reply
    /// does not decode into `M::Return`.
    pub async fn send<M: ProtocolMessage>(
        &self,
        data: M::Data,
        target: T::Target,
    ) -> Result<M::Return> {
        let value = self.send_message(M::TYPE, data, target).await?;
        Ok(serde_json::from_value(value)?)
    }
}

// ============================================================================
// Messenger - Listening
// ============================================================================

impl<T: Transport> Messenger<T> {
    /// Registers the handler for `message_type`.
    ///
    /// The handler may fail with any displayable error; the caller receives
    /// its string form.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateListener`] if the type already has a handler
    /// - any error from subscribing the root listener
    pub fn on_message<F, Fut, R, E>(
        &self,
        message_type: impl Into<String>,
        handler: F,
    ) -> Result<ListenerHandle<T>>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StdResult<R, E>> + Send + 'static,
        R: Serialize,
        E: Display,
    {
        let handler: Handler = Arc::new(move |message| {
            let reply = handler(message);
            Box::pin(async move {
                match reply.await {
                    Ok(value) => serde_json::to_value(value).map_err(|e| e.to_string()),
                    Err(err) => Err(err.to_string()),
                }
            })
        });

        self.register(message_type.into(), handler)
    }

    /// Registers a typed handler for protocol message `M`.
    ///
    /// # Errors
    ///
    /// Same as [`Messenger::on_message`].
    pub fn on<M, F, Fut, E>(&self, handler: F) -> Result<ListenerHandle<T>>
    where
        M: ProtocolMessage,
        F: Fn(Incoming<M::Data>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StdResult<M::Return, E>> + Send + 'static,
        E: Display,
    {
        let handler = Arc::new(handler);

        self.on_message(M::TYPE, move |message: Message| {
            let handler = Arc::clone(&handler);
            async move {
                let data = message
                    .data_as::<M::Data>()
                    .map_err(|e| e.to_string())?;
                let incoming = Incoming {
                    id: message.id,
                    data,
                    timestamp: message.timestamp,
                    sender: message.sender,
                };
                handler(incoming).await.map_err(|e| e.to_string())
            }
        })
    }

    /// Removes every handler and the root listener.
    ///
    /// Calls this messenger has in flight keep waiting for their answers.
    pub fn remove_all_listeners(&self) {
        let root = {
            let mut state = self.inner.state.lock();
            state.registry.clear();
            state.root.take()
        };

        if let Some(root) = root {
            root.unsubscribe();
            debug!("Root listener detached");
        }
    }

    /// Disposes the messenger's subscriptions.
    ///
    /// Removes every listener like [`Messenger::remove_all_listeners`] and
    /// abandons calls the transport is still waiting on. The messenger can
    /// still send and register again afterwards.
    pub fn close(&self) {
        self.remove_all_listeners();
        self.inner.transport.cancel_pending();
    }

    fn register(&self, message_type: String, handler: Handler) -> Result<ListenerHandle<T>> {
        let mut state = self.inner.state.lock();

        if state.root.is_none() {
            let dispatch = Inner::dispatcher(Arc::downgrade(&self.inner));
            state.root = Some(self.inner.transport.add_root_listener(dispatch)?);
            debug!("Root listener attached");
        }

        let id = state.registry.register(&message_type, handler)?;
        debug!(message_type = %message_type, "Listener registered");

        Ok(ListenerHandle {
            inner: Arc::downgrade(&self.inner),
            message_type,
            id,
        })
    }
}

// ============================================================================
// Inner - Dispatch
// ============================================================================

impl<T: Transport> Inner<T> {
    fn dispatcher(inner: Weak<Self>) -> Dispatch {
        Arc::new(move |raw| match inner.upgrade() {
            Some(inner) => inner.dispatch(raw),
            None => Box::pin(future::ready(Ok(None))),
        })
    }

    fn dispatch(&self, raw: Value) -> BoxFuture<'static, Result<Option<ResponseWrapper>>> {
        let logger = self.config.logger.clone();

        let message = match Message::from_wire(raw) {
            Ok(message) => message,
            Err(err) => {
                if self.config.break_error {
                    return Box::pin(future::ready(Ok(None)));
                }
                match &logger {
                    Some(logger) => logger.error(format_args!("[messaging] {err}")),
                    None => error!(error = %err, "Rejected inbound message"),
                }
                return Box::pin(future::ready(Err(err)));
            }
        };

        if let Some(logger) = &logger {
            logger.debug(format_args!(
                "[messaging] received {{id={}}} ─ᐅ {}: {}",
                message.id, message.message_type, message.data
            ));
        }

        let handler = self.state.lock().registry.get(&message.message_type);
        let Some(handler) = handler else {
            trace!(message_type = %message.message_type, "No handler registered, ignoring");
            return Box::pin(future::ready(Ok(None)));
        };

        Box::pin(async move {
            let id = message.id;
            let wrapper = match invoke(&handler, message).await {
                Ok(value) => ResponseWrapper::Res(value),
                Err(message) => ResponseWrapper::Err(message),
            };

            if let Some(logger) = &logger {
                logger.debug(format_args!(
                    "[messaging] responding {{id={id}}} ᐊ─ {wrapper:?}"
                ));
            }

            Ok(Some(wrapper))
        })
    }

    fn unregister(&self, message_type: &str, id: ListenerId) -> bool {
        let (removed, root) = {
            let mut state = self.state.lock();
            let removed = state.registry.unregister(message_type, id);
            let root = if state.registry.is_empty() {
                state.root.take()
            } else {
                None
            };
            (removed, root)
        };

        if removed {
            debug!(message_type, "Listener removed");
        }
        if let Some(root) = root {
            root.unsubscribe();
            debug!("Root listener detached");
        }

        removed
    }
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(root) = self.state.get_mut().root.take() {
            root.unsubscribe();
        }
    }
}

/// Runs a handler, turning panics into error strings.
async fn invoke(handler: &Handler, message: Message) -> StdResult<Value, String> {
    let reply = match catch_unwind(AssertUnwindSafe(|| handler(message))) {
        Ok(reply) => reply,
        Err(panic) => return Err(panic_message(panic.as_ref())),
    };

    match AssertUnwindSafe(reply).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

// ============================================================================
// ListenerHandle
// ============================================================================

/// Removes one handler registration.
///
/// Dropping the handle keeps the handler registered.
pub struct ListenerHandle<T: Transport> {
    inner: Weak<Inner<T>>,
    message_type: String,
    id: ListenerId,
}

impl<T: Transport> ListenerHandle<T> {
    /// Message type this handle was returned for.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Removes the handler; detaches the root listener if it was the last.
    ///
    /// Returns `false` if the registration was already gone.
    pub fn remove(self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.unregister(&self.message_type, self.id))
    }
}

impl<T: Transport> std::fmt::Debug for ListenerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("message_type", &self.message_type)
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::messaging::Logger;

    /// Transport that delivers every message to its own root listener.
    #[derive(Clone, Default)]
    struct LoopbackTransport {
        root: Arc<Mutex<Option<Dispatch>>>,
        subscriptions: Arc<AtomicUsize>,
    }

    impl LoopbackTransport {
        fn subscriptions(&self) -> usize {
            self.subscriptions.load(Ordering::SeqCst)
        }

        fn dispatch_raw(&self, raw: Value) -> BoxFuture<'static, Result<Option<ResponseWrapper>>> {
            let dispatch = self.root.lock().clone().expect("root listener");
            dispatch(raw)
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        type Target = ();

        async fn send(&self, message: Message, _target: ()) -> Result<Option<ResponseWrapper>> {
            let dispatch = self.root.lock().clone();
            match dispatch {
                Some(dispatch) => dispatch(message.to_wire()?).await,
                None => Err(Error::NoReceiver),
            }
        }

        fn add_root_listener(&self, dispatch: Dispatch) -> Result<Subscription> {
            *self.root.lock() = Some(dispatch);
            self.subscriptions.fetch_add(1, Ordering::SeqCst);

            let root = Arc::clone(&self.root);
            let subscriptions = Arc::clone(&self.subscriptions);
            Ok(Subscription::new(move || {
                *root.lock() = None;
                subscriptions.fetch_sub(1, Ordering::SeqCst);
            }))
        }
    }

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl Logger for RecordingLogger {
        fn debug(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().push(args.to_string());
        }
        fn log(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().push(args.to_string());
        }
        fn warn(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().push(args.to_string());
        }
        fn error(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().push(args.to_string());
        }
    }

    struct GetLength;

    impl ProtocolMessage for GetLength {
        const TYPE: &'static str = "getLength";
        type Data = String;
        type Return = usize;
    }

    fn messenger() -> (Messenger<LoopbackTransport>, LoopbackTransport) {
        let transport = LoopbackTransport::default();
        (
            Messenger::new(transport.clone(), MessengerConfig::default()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_get_length_round_trip() {
        let (messenger, _) = messenger();
        messenger
            .on_message("getLength", |message: Message| async move {
                let data: String = message.data_as().map_err(|e| e.to_string())?;
                Ok::<_, String>(data.len())
            })
            .expect("register");

        let length = messenger
            .send_message("getLength", "test", ())
            .await
            .expect("send");
        assert_eq!(length, json!(4));
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let (messenger, _) = messenger();
        messenger
            .on::<GetLength, _, _, _>(|request| async move {
                Ok::<_, String>(request.data.len())
            })
            .expect("register");

        let length = messenger
            .send::<GetLength>("hello".into(), ())
            .await
            .expect("send");
        assert_eq!(length, 5);
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let (messenger, _) = messenger();
        messenger
            .on_message("x", |_| async { Ok::<_, String>("fn1") })
            .expect("first");

        let err = messenger
            .on_message("x", |_| async { Ok::<_, String>("fn2") })
            .expect_err("second registration");
        assert!(err.to_string().contains('x'));

        let value = messenger.send_message("x", (), ()).await.expect("send");
        assert_eq!(value, json!("fn1"));
    }

    #[tokio::test]
    async fn test_handler_error_message_is_verbatim() {
        let (messenger, _) = messenger();
        messenger
            .on_message("fail", |_| async {
                Err::<Value, _>(std::io::Error::other("disk on fire"))
            })
            .expect("register");

        let err = messenger
            .send_message("fail", (), ())
            .await
            .expect_err("handler error");
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error() {
        let (messenger, _) = messenger();
        messenger
            .on_message("panic", |_| async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<Value, String>(Value::Null)
            })
            .expect("register");

        let err = messenger
            .send_message("panic", (), ())
            .await
            .expect_err("panic");
        assert_eq!(err.to_string(), "handler exploded");
    }

    #[tokio::test]
    async fn test_unknown_type_gets_no_response() {
        let (messenger, _) = messenger();
        messenger
            .on_message("known", |_| async { Ok::<_, String>(1) })
            .expect("register");

        let err = messenger
            .send_message("unknown", (), ())
            .await
            .expect_err("no handler");
        assert!(matches!(err, Error::NoResponse));
    }

    #[tokio::test]
    async fn test_root_listener_lifecycle() {
        let (messenger, transport) = messenger();
        assert_eq!(transport.subscriptions(), 0);

        let a = messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");
        let b = messenger
            .on_message("b", |_| async { Ok::<_, String>(2) })
            .expect("b");
        assert_eq!(transport.subscriptions(), 1);

        assert!(a.remove());
        assert_eq!(transport.subscriptions(), 1);
        assert!(messenger.has_root_listener());

        assert!(b.remove());
        assert_eq!(transport.subscriptions(), 0);
        assert!(!messenger.has_root_listener());
    }

    #[tokio::test]
    async fn test_dropping_last_clone_detaches_root_listener() {
        let (messenger, transport) = messenger();
        messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");

        let clone = messenger.clone();
        drop(messenger);
        assert_eq!(transport.subscriptions(), 1);
        assert!(clone.has_root_listener());

        drop(clone);
        assert_eq!(transport.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_stale_handle_leaves_new_registration() {
        let (messenger, _) = messenger();
        let first = messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("first");
        messenger.remove_all_listeners();

        messenger
            .on_message("a", |_| async { Ok::<_, String>(2) })
            .expect("second");
        assert!(!first.remove());
        assert_eq!(messenger.listener_count(), 1);
        assert_eq!(
            messenger.send_message("a", (), ()).await.expect("send"),
            json!(2)
        );
    }

    #[tokio::test]
    async fn test_remove_all_listeners() {
        let (messenger, transport) = messenger();
        messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");
        messenger
            .on_message("b", |_| async { Ok::<_, String>(1) })
            .expect("b");

        messenger.close();
        assert_eq!(messenger.listener_count(), 0);
        assert_eq!(transport.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_rejected_locally() {
        let (messenger, transport) = messenger();
        messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");

        let err = transport
            .dispatch_raw(json!({ "type": "a" }))
            .await
            .expect_err("missing timestamp");
        assert!(matches!(err, Error::InvalidEnvelope { .. }));
    }

    #[tokio::test]
    async fn test_break_error_ignores_malformed_envelope() {
        let transport = LoopbackTransport::default();
        let messenger = Messenger::new(
            transport.clone(),
            MessengerConfig::new().with_break_error(true),
        );
        messenger
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");

        let outcome = transport
            .dispatch_raw(json!({ "timestamp": 1 }))
            .await
            .expect("ignored");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_logger_traces_send_and_receive() {
        let logger = Arc::new(RecordingLogger::default());
        let transport = LoopbackTransport::default();
        let messenger = Messenger::new(
            transport,
            MessengerConfig::new().with_logger(logger.clone()),
        );
        messenger
            .on_message("ping", |_| async { Ok::<_, String>("pong") })
            .expect("register");

        messenger.send_message("ping", (), ()).await.expect("send");

        let lines = logger.lines.lock();
        assert!(lines.iter().any(|line| line.contains("send_message") && line.contains("─ᐅ")));
        assert!(lines.iter().any(|line| line.contains("received")));
        assert!(lines.iter().any(|line| line.contains("ᐊ─")));
    }

    #[tokio::test]
    async fn test_concurrent_calls_resolve_independently() {
        let (messenger, _) = messenger();
        messenger
            .on_message("double", |message: Message| async move {
                let n: i64 = message.data_as().map_err(|e| e.to_string())?;
                Ok::<_, String>(n * 2)
            })
            .expect("register");

        let (a, b) = tokio::join!(
            messenger.send_message("double", 1, ()),
            messenger.send_message("double", 21, ())
        );
        assert_eq!(a.expect("a"), json!(2));
        assert_eq!(b.expect("b"), json!(42));
    }

    proptest! {
        #[test]
        fn prop_handler_sees_data_unchanged(
            text in ".*",
            number in any::<i64>(),
            flags in proptest::collection::vec(any::<bool>(), 0..8),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            let payload = json!({ "text": text, "number": number, "flags": flags });

            let received = runtime.block_on(async {
                let (messenger, _) = messenger();
                messenger
                    .on_message("echo", |message: Message| async move {
                        Ok::<_, String>(message.data)
                    })
                    .expect("register");
                messenger.send_message("echo", &payload, ()).await
            });

            prop_assert_eq!(received.expect("send"), payload);
        }
    }
}
