//! Wire-level message types.
//!
//! # Protocol Overview
//!
//! | Record | Carried by | Purpose |
//! |--------|------------|---------|
//! | [`Message`] | all transports | Request envelope `{id, type, data, timestamp}` |
//! | [`ResponseWrapper`] | all transports | Handler outcome `{res}` / `{err}` |
//! | [`NamespaceEnvelope`] | window, custom event | `REQUEST` / `RESPONSE` partitioned by namespace |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Envelope, sender metadata, response wrapper |
//! | `namespace` | Namespace envelope for broadcast transports |
//! | `typed` | Compile-time protocol map |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and response wrapper.
pub mod message;

/// Namespace envelope.
pub mod namespace;

/// Typed protocol map.
pub mod typed;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Message, MessageSender, ResponseWrapper, TabInfo};
pub use namespace::NamespaceEnvelope;
pub use typed::{Incoming, ProtocolMessage};
