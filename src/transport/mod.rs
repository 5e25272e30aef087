//! Transport adapters.
//!
//! Each adapter carries envelopes over one channel family and plugs into
//! the shared [`Messenger`](crate::messaging::Messenger) engine.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐     runtime channel      ┌────────────────────┐
//! │  Content script    │◄────────────────────────►│  Background        │
//! │  RuntimeTransport  │   (native reply path)    │  RuntimeTransport  │
//! └─────────┬──────────┘                          └────────────────────┘
//!           │ window messages / custom events
//!           │ (REQUEST/RESPONSE envelopes, namespaced)
//! ┌─────────┴──────────┐
//! │  Page / injected   │
//! │  NamespaceTransport│
//! └────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `runtime` | Extension runtime channel |
//! | `namespace` | Request/response emulation over broadcasts |
//! | `window` | Window `postMessage` channel |
//! | `custom_event` | Named DOM events between isolated worlds |

// ============================================================================
// Submodules
// ============================================================================

/// Custom-event channel between isolated worlds.
pub mod custom_event;

/// Request/response emulation over broadcast channels.
pub mod namespace;

/// Extension runtime channel.
pub mod runtime;

/// Window message channel.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use custom_event::{
    CustomEventChannel, CustomEventMessenger, CustomEventTransport, define_custom_event_messaging,
};
pub use namespace::{BroadcastChannel, BroadcastListener, Direction, NamespaceTransport};
pub use runtime::{ExtensionMessenger, RuntimeTransport, define_extension_messaging};
pub use window::{WindowChannel, WindowMessenger, WindowTransport, define_window_messaging};
