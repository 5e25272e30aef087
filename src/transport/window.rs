//! Window transport.
//!
//! Connects a page's main world with content scripts running in the same
//! window through `postMessage`. Every messenger in the window sees every
//! envelope, so calls are partitioned by namespace and filtered by instance.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::host::{ListenerKey, WindowEvent, WindowHost, WindowListener};
use crate::messaging::{Messenger, NamespaceConfig};

use super::namespace::{BroadcastChannel, BroadcastListener, Direction, NamespaceTransport};

// ============================================================================
// Constants
// ============================================================================

/// Target origin used when the caller does not restrict delivery.
const ANY_ORIGIN: &str = "*";

// ============================================================================
// WindowChannel
// ============================================================================

/// [`BroadcastChannel`] over a window's message events.
///
/// The per-send target is an optional target origin; `None` posts to any
/// origin.
pub struct WindowChannel<H: WindowHost> {
    host: H,
}

impl<H: WindowHost> WindowChannel<H> {
    /// Wraps a window host.
    #[inline]
    #[must_use]
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Returns the host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: WindowHost> BroadcastChannel for WindowChannel<H> {
    type Target = Option<String>;

    fn sender_origin(&self) -> Option<String> {
        Some(self.host.origin())
    }

    fn target_origin(target: &Option<String>) -> Option<&str> {
        target.as_deref()
    }

    fn publish(&self, _direction: Direction, data: Value, origin: Option<&str>) -> Result<()> {
        self.host.post_message(data, origin.unwrap_or(ANY_ORIGIN))
    }

    fn listen(&self, _direction: Direction, listener: BroadcastListener) -> ListenerKey {
        let listener: WindowListener = Arc::new(move |event: WindowEvent| listener(event.data));
        self.host.add_message_listener(listener)
    }

    fn unlisten(&self, key: ListenerKey) {
        self.host.remove_message_listener(key);
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Transport over a window's message events.
pub type WindowTransport<H> = NamespaceTransport<WindowChannel<H>>;

/// Messenger over a window's message events.
pub type WindowMessenger<H> = Messenger<WindowTransport<H>>;

/// Creates a messenger over the message events of `host`.
#[must_use]
pub fn define_window_messaging<H: WindowHost>(
    host: H,
    config: NamespaceConfig,
) -> WindowMessenger<H> {
    let transport = NamespaceTransport::new(WindowChannel::new(host), config.namespace);
    Messenger::new(transport, config.messenger)
}

// ============================================================================
// Tests
// ============================================================================
