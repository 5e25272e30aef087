//! Deep RPC proxies.
//!
//! Exposes an object living in one context to every other context. Nested
//! members are reached by dotted path and each call is exactly one message.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `service` | Real-side [`ServiceObject`] |
//! | `proxy` | [`ProxyService`] registration/lookup and the [`ServiceRef`] stand-in |
//! | `client` | `service_client!` typed client generator |

// ============================================================================
// Submodules
// ============================================================================

/// Typed client generator.
pub mod client;

/// Registration, lookup and stand-ins.
pub mod proxy;

/// Real-side service objects.
pub mod service;

// ============================================================================
// Re-exports
// ============================================================================

pub use proxy::{ProxyCall, ProxyService, ServiceCaller, ServiceRef, encode_arg, is_proxy_object};
pub use service::{MethodFn, ServiceObject};
