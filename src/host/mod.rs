//! Host-provided transport primitives.
//!
//! The messaging core never talks to a browser directly. It consumes three
//! primitives through the traits below, and anything that implements them
//! (a WebExtension binding, a test double) can carry messages.
//!
//! | Trait | Browser counterpart | Used by |
//! |-------|---------------------|---------|
//! | [`RuntimeHost`] | `runtime.sendMessage` / `tabs.sendMessage` / `runtime.onMessage` | runtime transport |
//! | [`WindowHost`] | `window.postMessage` / `message` event | window transport |
//! | [`EventBus`] | `dispatchEvent(CustomEvent)` / `cloneInto` | custom event transport |
//!
//! [`memory`] provides an in-process implementation of all three.

// ============================================================================
// Submodules
// ============================================================================

/// In-memory host used by tests and local tooling.
pub mod memory;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{FrameId, TabId};
use crate::protocol::MessageSender;

// ============================================================================
// ListenerKey
// ============================================================================

/// Handle returned by a host when a native listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

impl ListenerKey {
    /// Generates a process-unique key.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Runtime Channel
// ============================================================================

/// Addressing for a runtime message sent to a tab instead of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTarget {
    /// Tab whose content scripts should receive the message.
    pub tab_id: TabId,
    /// Restrict delivery to one frame of the tab.
    pub frame_id: Option<FrameId>,
}

impl RuntimeTarget {
    /// Targets every frame of a tab.
    #[inline]
    #[must_use]
    pub const fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id,
            frame_id: None,
        }
    }

    /// Targets one frame of a tab.
    #[inline]
    #[must_use]
    pub const fn frame(tab_id: TabId, frame_id: FrameId) -> Self {
        Self {
            tab_id,
            frame_id: Some(frame_id),
        }
    }
}

impl From<TabId> for RuntimeTarget {
    fn from(tab_id: TabId) -> Self {
        Self::tab(tab_id)
    }
}

/// Native runtime listener.
///
/// Receives the message and the sender metadata; resolving to `Some` replies,
/// `None` leaves the reply to other listeners.
pub type RuntimeListener =
    Arc<dyn Fn(Value, MessageSender) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

/// Point-to-point runtime channel of the extension platform.
#[async_trait]
pub trait RuntimeHost: Send + Sync + 'static {
    /// Sends a message and waits for the first reply.
    ///
    /// Without a target the message goes to every extension context except
    /// the sender; with one it goes to the content scripts of that tab.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoReceiver`] when no listener exists anywhere.
    async fn send_message(
        &self,
        message: Value,
        target: Option<RuntimeTarget>,
    ) -> Result<Option<Value>>;

    /// Attaches an inbound message listener.
    fn add_listener(&self, listener: RuntimeListener) -> ListenerKey;

    /// Detaches a listener. Unknown keys are ignored.
    fn remove_listener(&self, key: ListenerKey);

    /// Number of listeners attached through this context.
    fn listener_count(&self) -> usize;
}

// ============================================================================
// Window Channel
// ============================================================================

/// A `message` event observed on the window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    /// Posted payload.
    pub data: Value,
    /// Origin of the posting window.
    pub origin: String,
}

/// Native window `message` listener.
pub type WindowListener = Arc<dyn Fn(WindowEvent) + Send + Sync>;

/// Window-level broadcast channel with origin-based addressing.
pub trait WindowHost: Send + Sync + 'static {
    /// Origin of the window this context runs in.
    fn origin(&self) -> String;

    /// Posts a message; `"*"` matches any receiving origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot post at all.
    fn post_message(&self, data: Value, target_origin: &str) -> Result<()>;

    /// Attaches a `message` listener. Every post reaches it, including the
    /// context's own.
    fn add_message_listener(&self, listener: WindowListener) -> ListenerKey;

    /// Detaches a listener. Unknown keys are ignored.
    fn remove_message_listener(&self, key: ListenerKey);

    /// Number of attached listeners.
    fn listener_count(&self) -> usize;
}

// ============================================================================
// Custom Event Bus
// ============================================================================

/// Native custom event listener, receiving the event `detail`.
pub type EventListener = Arc<dyn Fn(Value) + Send + Sync>;

/// In-page custom event bus shared by the page and isolated worlds.
pub trait EventBus: Send + Sync + 'static {
    /// Dispatches a named event to every listener for that name.
    fn dispatch_event(&self, name: &str, detail: Value);

    /// Attaches a listener for a named event.
    fn add_event_listener(&self, name: &str, listener: EventListener) -> ListenerKey;

    /// Detaches a listener. Unknown keys are ignored.
    fn remove_event_listener(&self, key: ListenerKey);

    /// Deep-clones a detail so it is visible on the other side of an
    /// isolated-world boundary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] with the host's text if the
    /// value cannot cross.
    fn clone_detail(&self, detail: Value) -> Result<Value>;

    /// Number of attached listeners.
    fn listener_count(&self) -> usize;
}
