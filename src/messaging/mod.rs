//! Message correlation engine.
//!
//! This module turns one-way transport primitives into request/response
//! calls with per-type dispatch.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Messenger`] | Sends messages and owns the per-type handlers |
//! | [`Transport`] | Delivery strategy the messenger is generic over |
//! | [`ListenerRegistry`] | At most one handler per message type |
//! | [`MessengerConfig`] | Logger and error-handling options |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Configuration and the [`Logger`] trait |
//! | `generic` | The engine and the transport contract |
//! | `registry` | Per-type listener table |

// ============================================================================
// Submodules
// ============================================================================

/// Configuration and diagnostic logging.
pub mod config;

/// Transport-agnostic request/response engine.
pub mod generic;

/// Per-type listener table.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{DEFAULT_NAMESPACE, Logger, MessengerConfig, NamespaceConfig, TracingLogger};
pub use generic::{Dispatch, ListenerHandle, Messenger, Subscription, Transport};
pub use registry::{Handler, ListenerRegistry};
