//! Error types for extension messaging.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use extension_messaging::{Error, Result};
//!
//! async fn example(messenger: &ExtensionMessenger) -> Result<()> {
//!     let length = messenger.send_message("getLength", "test", None).await?;
//!     assert_eq!(length, 4);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Protocol | [`Error::InvalidEnvelope`], [`Error::DuplicateListener`] |
//! | Call | [`Error::NoResponse`], [`Error::Remote`], [`Error::NoReceiver`], [`Error::Closed`] |
//! | Host | [`Error::Host`], [`Error::Serialization`] |
//! | Service | [`Error::ServiceNotRegistered`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound message is not a valid envelope.
    ///
    /// Raised locally by the receiving root listener when `type` is not a
    /// string or `timestamp` is not a number. Never sent back to the caller.
    #[error(
        "Unknown message format, must include the 'type' & 'timestamp' fields, received: {received}"
    )]
    InvalidEnvelope {
        /// JSON rendering of the rejected payload.
        received: String,
    },

    /// A handler is already registered for this message type.
    ///
    /// Raised synchronously by `on_message`, before anything is installed.
    #[error("In this context, only one listener can be setup for {message_type}")]
    DuplicateListener {
        /// The message type that is already claimed.
        message_type: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// No responder answered the message.
    #[error("No response")]
    NoResponse,

    /// The remote handler failed.
    ///
    /// Carries the stringified error exactly as the handler produced it.
    #[error("{message}")]
    Remote {
        /// Error message from the remote handler.
        message: String,
    },

    /// The runtime channel has no listener anywhere.
    #[error("Could not establish connection. Receiving end does not exist.")]
    NoReceiver,

    /// The messenger was torn down while the call was still pending.
    #[error("Messenger closed")]
    Closed,

    // ========================================================================
    // Host Errors
    // ========================================================================
    /// Host primitive failure.
    #[error("Host error: {message}")]
    Host {
        /// Description of the host failure.
        message: String,
    },

    /// Value could not cross an isolated-world boundary.
    #[error("{message}")]
    Serialization {
        /// Error text reported by the host's clone primitive.
        message: String,
    },

    // ========================================================================
    // Service Errors
    // ========================================================================
    /// Service requested in the real context before it was registered.
    #[error("Failed to get an instance of {name}: in the real context, but the service was never registered")]
    ServiceNotRegistered {
        /// Service name.
        name: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid envelope error from the rejected payload.
    #[inline]
    pub fn invalid_envelope(received: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            received: received.into(),
        }
    }

    /// Creates a duplicate listener error.
    #[inline]
    pub fn duplicate_listener(message_type: impl Into<String>) -> Self {
        Self::DuplicateListener {
            message_type: message_type.into(),
        }
    }

    /// Creates a remote handler error.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a host error.
    #[inline]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[inline]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a service not registered error.
    #[inline]
    pub fn service_not_registered(name: impl Into<String>) -> Self {
        Self::ServiceNotRegistered { name: name.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the remote handler raised this error.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if nobody answered the call.
    #[inline]
    #[must_use]
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse | Self::NoReceiver)
    }

    /// Returns `true` if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvelope { .. } | Self::DuplicateListener { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_display_is_verbatim() {
        let err = Error::remote("Something went wrong");
        assert_eq!(err.to_string(), "Something went wrong");
    }

    #[test]
    fn test_no_response_display() {
        assert_eq!(Error::NoResponse.to_string(), "No response");
    }

    #[test]
    fn test_closed_is_a_call_error() {
        assert_eq!(Error::Closed.to_string(), "Messenger closed");
        assert!(!Error::Closed.is_protocol());
        assert!(!Error::Closed.is_no_response());
    }

    #[test]
    fn test_duplicate_listener_names_type() {
        let err = Error::duplicate_listener("getLength");
        assert!(err.to_string().contains("getLength"));
        assert!(err.is_protocol());
    }

    #[test]
    fn test_is_no_response() {
        assert!(Error::NoResponse.is_no_response());
        assert!(Error::NoReceiver.is_no_response());
        assert!(!Error::remote("x").is_no_response());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
