//! Extension messaging - Request/response calls between browser extension contexts.
//!
//! This library turns the fire-and-forget channels of a browser extension
//! into awaitable calls, and builds deep RPC proxies on top of them.
//!
//! # Architecture
//!
//! Every context (background, extension page, content script, injected
//! script) owns one [`Messenger`] per channel:
//!
//! - **Correlation engine**: wraps payloads in `{id, type, data, timestamp}`
//!   envelopes, dispatches inbound ones to one handler per type, and wraps
//!   results as `{res}` / `{err}`
//! - **Transports**: runtime channel (native replies), window messages and
//!   custom events (namespaced broadcasts with emulated replies)
//! - **RPC proxies**: one context holds a real [`ServiceObject`], the others
//!   call into it by dotted path
//!
//! Key design principles:
//!
//! - One root listener per messenger, attached with the first handler and
//!   detached with the last
//! - Handler errors cross contexts as plain strings
//! - The environment is reached only through the [`host`] traits
//!
//! # Quick Start
//!
//! ```no_run
//! use extension_messaging::host::memory::MemoryRuntime;
//! use extension_messaging::{Message, MessengerConfig, Result, define_extension_messaging};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runtime = MemoryRuntime::new("my-extension");
//!     let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
//!     let popup = define_extension_messaging(
//!         runtime.extension_page("popup.html"),
//!         MessengerConfig::default().with_tracing_logger(),
//!     );
//!
//!     background.on_message("getLength", |message: Message| async move {
//!         let data: String = message.data_as().map_err(|e| e.to_string())?;
//!         Ok::<_, String>(data.len())
//!     })?;
//!
//!     let length = popup.send_message("getLength", "test", None).await?;
//!     println!("Length: {length}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Execution context detection |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | Host primitive traits and the in-memory host |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`messaging`] | Correlation engine |
//! | [`protocol`] | Wire envelopes and typed protocol maps |
//! | [`rpc`] | Deep RPC proxies |
//! | [`transport`] | Runtime, window and custom-event transports |

// ============================================================================
// Modules
// ============================================================================

/// Execution context detection for the RPC layer.
pub mod context;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host primitives.
///
/// Runtime channel, window messages and in-page event bus, plus an
/// in-memory implementation of all three.
pub mod host;

/// Type-safe identifiers for messaging entities.
pub mod identifiers;

/// Transport-agnostic correlation engine.
///
/// Use [`Messenger`] through one of the transport constructors.
pub mod messaging;

/// Wire envelopes.
pub mod protocol;

/// Deep RPC proxies over a messenger.
pub mod rpc;

/// Transport adapters.
pub mod transport;

#[doc(hidden)]
pub mod __private {
    pub use serde_json::Value;
}

// ============================================================================
// Re-exports
// ============================================================================

// Context types
pub use context::{ContextDetector, ExtensionContext};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{FrameId, InstanceId, MessageId, TabId};

// Messaging types
pub use messaging::{
    DEFAULT_NAMESPACE, ListenerHandle, Logger, Messenger, MessengerConfig, NamespaceConfig,
    Transport, TracingLogger,
};

// Protocol types
pub use protocol::{Message, MessageSender, ProtocolMessage, ResponseWrapper};

// RPC types
pub use rpc::{ProxyService, ServiceObject, ServiceRef, is_proxy_object};

// Transport types
pub use host::RuntimeTarget;
pub use transport::{
    CustomEventMessenger, ExtensionMessenger, WindowMessenger, define_custom_event_messaging,
    define_extension_messaging, define_window_messaging,
};
