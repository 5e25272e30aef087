//! Custom-event transport.
//!
//! Connects a content script's isolated world with scripts it injected into
//! the page's main world. Envelopes travel as event details on
//! `<namespace>:request` and `<namespace>:response`; every detail is passed
//! through the host's clone primitive first, so values that cannot cross the
//! world boundary fail loudly instead of arriving mangled.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::host::{EventBus, ListenerKey};
use crate::messaging::{Messenger, NamespaceConfig};

use super::namespace::{BroadcastChannel, BroadcastListener, Direction, NamespaceTransport};

// ============================================================================
// CustomEventChannel
// ============================================================================

/// [`BroadcastChannel`] over named DOM events.
pub struct CustomEventChannel<B: EventBus> {
    bus: B,
    request_event: String,
    response_event: String,
}

impl<B: EventBus> CustomEventChannel<B> {
    /// Creates a channel using the event names of `namespace`.
    #[must_use]
    pub fn new(bus: B, namespace: &str) -> Self {
        Self {
            bus,
            request_event: format!("{namespace}:request"),
            response_event: format!("{namespace}:response"),
        }
    }

    /// Returns the event bus.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Returns the event name carrying `direction`.
    #[inline]
    #[must_use]
    pub fn event_name(&self, direction: Direction) -> &str {
        match direction {
            Direction::Request => &self.request_event,
            Direction::Response => &self.response_event,
        }
    }
}

impl<B: EventBus> BroadcastChannel for CustomEventChannel<B> {
    type Target = ();

    fn sender_origin(&self) -> Option<String> {
        None
    }

    fn target_origin(_target: &()) -> Option<&str> {
        None
    }

    fn publish(&self, direction: Direction, data: Value, _origin: Option<&str>) -> Result<()> {
        let detail = self.bus.clone_detail(data)?;
        self.bus.dispatch_event(self.event_name(direction), detail);
        Ok(())
    }

    fn listen(&self, direction: Direction, listener: BroadcastListener) -> ListenerKey {
        self.bus
            .add_event_listener(self.event_name(direction), listener)
    }

    fn unlisten(&self, key: ListenerKey) {
        self.bus.remove_event_listener(key);
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Transport over named DOM events.
pub type CustomEventTransport<B> = NamespaceTransport<CustomEventChannel<B>>;

/// Messenger over named DOM events.
pub type CustomEventMessenger<B> = Messenger<CustomEventTransport<B>>;

/// Creates a messenger over the events of `bus`.
#[must_use]
pub fn define_custom_event_messaging<B: EventBus>(
    bus: B,
    config: NamespaceConfig,
) -> CustomEventMessenger<B> {
    let channel = CustomEventChannel::new(bus, &config.namespace);
    let transport = NamespaceTransport::new(channel, config.namespace);
    Messenger::new(transport, config.messenger)
}

// ============================================================================
// Tests
// ============================================================================
