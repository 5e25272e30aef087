//! In-memory browser host.
//!
//! Implements every host primitive inside one process so messengers in
//! different simulated contexts can talk to each other.
//!
//! # Example
//!
//! ```ignore
//! let runtime = MemoryRuntime::new("extension-id");
//! let background = runtime.background();
//! let content = runtime.content_script(tab_id, FrameId::main(), "https://example.com");
//!
//! let window = MemoryWindow::new("https://example.com");
//! let bus = MemoryEventBus::new();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{FrameId, TabId};
use crate::protocol::{MessageSender, TabInfo};

use super::{
    EventBus, EventListener, ListenerKey, RuntimeHost, RuntimeListener, RuntimeTarget,
    WindowEvent, WindowHost, WindowListener,
};

// ============================================================================
// MemoryRuntime
// ============================================================================

/// Simulated extension runtime shared by all contexts of one extension.
#[derive(Clone)]
pub struct MemoryRuntime {
    inner: Arc<RuntimeShared>,
}

struct RuntimeShared {
    extension_id: String,
    endpoints: Mutex<FxHashMap<u64, Endpoint>>,
    next_endpoint: AtomicUsize,
    messages_sent: AtomicUsize,
}

/// Where a runtime context lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointKind {
    /// Background, popup, options and other extension pages.
    Extension,
    /// Content script injected into a tab frame.
    ContentScript { tab_id: TabId, frame_id: FrameId },
}

struct Endpoint {
    kind: EndpointKind,
    listeners: Vec<(ListenerKey, RuntimeListener)>,
}

impl MemoryRuntime {
    /// Creates a runtime for the given extension ID.
    #[must_use]
    pub fn new(extension_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RuntimeShared {
                extension_id: extension_id.into(),
                endpoints: Mutex::new(FxHashMap::default()),
                next_endpoint: AtomicUsize::new(1),
                messages_sent: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates the background context.
    #[must_use]
    pub fn background(&self) -> MemoryRuntimeContext {
        self.extension_page("_generated_background_page.html")
    }

    /// Creates an extension page context (popup, options, ...).
    #[must_use]
    pub fn extension_page(&self, path: &str) -> MemoryRuntimeContext {
        let origin = format!("chrome-extension://{}", self.inner.extension_id);
        let sender = MessageSender {
            id: Some(self.inner.extension_id.clone()),
            url: Some(format!("{origin}/{}", path.trim_start_matches('/'))),
            origin: Some(origin),
            tab: None,
            frame_id: None,
        };
        self.attach(EndpointKind::Extension, sender)
    }

    /// Creates a content script context in a tab frame.
    #[must_use]
    pub fn content_script(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        url: &str,
    ) -> MemoryRuntimeContext {
        let origin = Url::parse(url)
            .ok()
            .map(|parsed| parsed.origin().ascii_serialization());
        let sender = MessageSender {
            id: Some(self.inner.extension_id.clone()),
            url: Some(url.to_string()),
            origin,
            tab: Some(TabInfo {
                id: tab_id,
                url: Some(url.to_string()),
            }),
            frame_id: Some(frame_id),
        };
        self.attach(EndpointKind::ContentScript { tab_id, frame_id }, sender)
    }

    /// Total number of `send_message` calls across all contexts.
    #[must_use]
    pub fn messages_sent(&self) -> usize {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    fn attach(&self, kind: EndpointKind, sender: MessageSender) -> MemoryRuntimeContext {
        let endpoint = self.inner.next_endpoint.fetch_add(1, Ordering::Relaxed) as u64;
        self.inner.endpoints.lock().insert(
            endpoint,
            Endpoint {
                kind,
                listeners: Vec::new(),
            },
        );
        MemoryRuntimeContext {
            runtime: self.clone(),
            endpoint,
            sender,
        }
    }
}

// ============================================================================
// MemoryRuntimeContext
// ============================================================================

/// One context's view of a [`MemoryRuntime`].
#[derive(Clone)]
pub struct MemoryRuntimeContext {
    runtime: MemoryRuntime,
    endpoint: u64,
    sender: MessageSender,
}

impl MemoryRuntimeContext {
    /// Sender metadata attached to this context's messages.
    #[inline]
    #[must_use]
    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    /// Collects listeners of every other endpoint the message should reach.
    fn receivers(&self, target: Option<RuntimeTarget>) -> Vec<RuntimeListener> {
        let endpoints = self.runtime.inner.endpoints.lock();
        endpoints
            .iter()
            .filter(|(id, _)| **id != self.endpoint)
            .filter(|(_, endpoint)| match (&endpoint.kind, target) {
                (EndpointKind::Extension, None) => true,
                (EndpointKind::ContentScript { tab_id, frame_id }, Some(target)) => {
                    *tab_id == target.tab_id
                        && target.frame_id.is_none_or(|wanted| wanted == *frame_id)
                }
                _ => false,
            })
            .flat_map(|(_, endpoint)| endpoint.listeners.iter().map(|(_, l)| Arc::clone(l)))
            .collect()
    }
}

#[async_trait]
impl RuntimeHost for MemoryRuntimeContext {
    async fn send_message(
        &self,
        message: Value,
        target: Option<RuntimeTarget>,
    ) -> Result<Option<Value>> {
        self.runtime
            .inner
            .messages_sent
            .fetch_add(1, Ordering::Relaxed);

        let receivers = self.receivers(target);
        if receivers.is_empty() {
            return Err(Error::NoReceiver);
        }

        trace!(receivers = receivers.len(), "Delivering runtime message");

        // First listener to produce a reply wins.
        let mut replies: FuturesUnordered<_> = receivers
            .into_iter()
            .map(|listener| listener(message.clone(), self.sender.clone()))
            .collect();

        while let Some(reply) = replies.next().await {
            if reply.is_some() {
                return Ok(reply);
            }
        }

        Ok(None)
    }

    fn add_listener(&self, listener: RuntimeListener) -> ListenerKey {
        let key = ListenerKey::generate();
        if let Some(endpoint) = self.runtime.inner.endpoints.lock().get_mut(&self.endpoint) {
            endpoint.listeners.push((key, listener));
        }
        key
    }

    fn remove_listener(&self, key: ListenerKey) {
        if let Some(endpoint) = self.runtime.inner.endpoints.lock().get_mut(&self.endpoint) {
            endpoint.listeners.retain(|(existing, _)| *existing != key);
        }
    }

    fn listener_count(&self) -> usize {
        self.runtime
            .inner
            .endpoints
            .lock()
            .get(&self.endpoint)
            .map_or(0, |endpoint| endpoint.listeners.len())
    }
}

// ============================================================================
// MemoryWindow
// ============================================================================

/// Simulated browser window shared by the page and its content scripts.
///
/// Delivery is asynchronous: each post is handed to a spawned task, so a
/// tokio runtime must be running.
#[derive(Clone)]
pub struct MemoryWindow {
    inner: Arc<WindowShared>,
}

struct WindowShared {
    origin: String,
    listeners: Mutex<Vec<(ListenerKey, WindowListener)>>,
}

impl MemoryWindow {
    /// Creates a window loaded from `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WindowShared {
                origin: origin.into(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl WindowHost for MemoryWindow {
    fn origin(&self) -> String {
        self.inner.origin.clone()
    }

    fn post_message(&self, data: Value, target_origin: &str) -> Result<()> {
        if !origin_matches(target_origin, &self.inner.origin) {
            trace!(target_origin, origin = %self.inner.origin, "Dropping post for other origin");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::host(format!("window delivery needs a runtime: {e}")))?;

        let shared = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let event = WindowEvent {
                data,
                origin: shared.origin.clone(),
            };
            let listeners: Vec<_> = shared
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in listeners {
                listener(event.clone());
            }
        });

        Ok(())
    }

    fn add_message_listener(&self, listener: WindowListener) -> ListenerKey {
        let key = ListenerKey::generate();
        self.inner.listeners.lock().push((key, listener));
        key
    }

    fn remove_message_listener(&self, key: ListenerKey) {
        self.inner
            .listeners
            .lock()
            .retain(|(existing, _)| *existing != key);
    }

    fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// `postMessage` target-origin check.
fn origin_matches(target_origin: &str, origin: &str) -> bool {
    if target_origin == "*" {
        return true;
    }

    match (Url::parse(target_origin), Url::parse(origin)) {
        (Ok(target), Ok(actual)) => target.origin() == actual.origin(),
        _ => target_origin == origin,
    }
}

// ============================================================================
// MemoryEventBus
// ============================================================================

/// Predicate deciding whether a detail may cross the world boundary.
pub type CloneGuard = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Simulated in-page event bus.
///
/// Dispatch is synchronous, like `dispatchEvent`.
#[derive(Clone, Default)]
pub struct MemoryEventBus {
    inner: Arc<BusShared>,
}

#[derive(Default)]
struct BusShared {
    listeners: Mutex<Vec<(ListenerKey, String, EventListener)>>,
    clone_guard: Option<CloneGuard>,
}

impl MemoryEventBus {
    /// Creates an event bus where every detail can be cloned.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an event bus whose clone primitive rejects some values.
    #[must_use]
    pub fn with_clone_guard(guard: CloneGuard) -> Self {
        Self {
            inner: Arc::new(BusShared {
                listeners: Mutex::new(Vec::new()),
                clone_guard: Some(guard),
            }),
        }
    }
}

impl EventBus for MemoryEventBus {
    fn dispatch_event(&self, name: &str, detail: Value) {
        let listeners: Vec<_> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(_, event, _)| event == name)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(detail.clone());
        }
    }

    fn add_event_listener(&self, name: &str, listener: EventListener) -> ListenerKey {
        let key = ListenerKey::generate();
        self.inner
            .listeners
            .lock()
            .push((key, name.to_string(), listener));
        key
    }

    fn remove_event_listener(&self, key: ListenerKey) {
        self.inner
            .listeners
            .lock()
            .retain(|(existing, _, _)| *existing != key);
    }

    fn clone_detail(&self, detail: Value) -> Result<Value> {
        if let Some(guard) = &self.inner.clone_guard {
            guard(&detail).map_err(Error::serialization)?;
        }
        Ok(detail)
    }

    fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[tokio::test]
    async fn test_runtime_without_listeners_rejects() {
        let runtime = MemoryRuntime::new("ext");
        let popup = runtime.extension_page("popup.html");

        let err = popup
            .send_message(json!("hi"), None)
            .await
            .expect_err("no receiver");
        assert!(matches!(err, Error::NoReceiver));
    }

    #[tokio::test]
    async fn test_runtime_skips_sender_and_routes_by_tab() {
        let runtime = MemoryRuntime::new("ext");
        let background = runtime.background();
        let content = runtime.content_script(tab(3), FrameId::main(), "https://a.com/page");

        content.add_listener(Arc::new(|message, _| {
            Box::pin(async move { Some(json!({ "echo": message })) })
        }));

        // Content scripts are not reached by untargeted messages.
        let err = background.send_message(json!(1), None).await;
        assert!(matches!(err, Err(Error::NoReceiver)));

        let reply = background
            .send_message(json!(1), Some(RuntimeTarget::tab(tab(3))))
            .await
            .expect("reply");
        assert_eq!(reply, Some(json!({ "echo": 1 })));

        let other_tab = background
            .send_message(json!(1), Some(RuntimeTarget::tab(tab(4))))
            .await;
        assert!(matches!(other_tab, Err(Error::NoReceiver)));
        assert_eq!(runtime.messages_sent(), 3);
    }

    #[tokio::test]
    async fn test_runtime_attaches_sender() {
        let runtime = MemoryRuntime::new("ext");
        let background = runtime.background();
        let content = runtime.content_script(tab(9), FrameId::new(2), "https://a.com/x");

        background.add_listener(Arc::new(|_, sender| {
            Box::pin(async move { serde_json::to_value(sender).ok() })
        }));

        let reply = content
            .send_message(json!(null), None)
            .await
            .expect("reply")
            .expect("some");
        assert_eq!(reply["tab"]["id"], 9);
        assert_eq!(reply["frameId"], 2);
        assert_eq!(reply["origin"], "https://a.com");
    }

    #[test]
    fn test_origin_matches() {
        assert!(origin_matches("*", "https://a.com"));
        assert!(origin_matches("https://a.com/some/path", "https://a.com"));
        assert!(!origin_matches("https://b.com", "https://a.com"));
    }

    #[test]
    fn test_event_bus_dispatches_by_name() {
        let bus = MemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let key = bus.add_event_listener(
            "ns:request",
            Arc::new(move |detail| sink.lock().push(detail)),
        );
        bus.dispatch_event("ns:request", json!(1));
        bus.dispatch_event("ns:response", json!(2));
        bus.remove_event_listener(key);
        bus.dispatch_event("ns:request", json!(3));

        assert_eq!(*seen.lock(), vec![json!(1)]);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_clone_guard() {
        let bus = MemoryEventBus::with_clone_guard(Arc::new(|detail| {
            if detail.to_string().contains("secret") {
                Err("Permission denied to access object".into())
            } else {
                Ok(())
            }
        }));

        assert!(bus.clone_detail(json!({ "a": 1 })).is_ok());
        let err = bus.clone_detail(json!({ "a": "secret" })).expect_err("rejected");
        assert_eq!(err.to_string(), "Permission denied to access object");
    }
}
