//! Message envelope and response wrapper.
//!
//! These are the records every transport carries:
//!
//! Envelope:
//! ```json
//! { "id": 4312, "type": "getLength", "data": "test", "timestamp": 1700000000000 }
//! ```
//!
//! Response wrapper (exactly one key):
//! ```json
//! { "res": 4 }
//! { "err": "Something went wrong" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{FrameId, MessageId, TabId};

// ============================================================================
// Message
// ============================================================================

/// Envelope exchanged between contexts.
///
/// Built fresh for every call and never mutated after it is sent. The
/// receiving runtime transport attaches [`MessageSender`] metadata before
/// dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Locally unique envelope ID.
    #[serde(default)]
    pub id: MessageId,

    /// Selects the per-type handler.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Caller-supplied payload.
    #[serde(default)]
    pub data: Value,

    /// Milliseconds since the Unix epoch at send time.
    pub timestamp: u64,

    /// Sender identity, attached on receipt by the runtime transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<MessageSender>,
}

impl Message {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(id: MessageId, message_type: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            data,
            timestamp: now_millis(),
            sender: None,
        }
    }

    /// Validates and decodes an inbound payload.
    ///
    /// `type` must be a string and `timestamp` a number; everything else is
    /// lenient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvelope`] naming the rejected payload.
    pub fn from_wire(raw: Value) -> Result<Self> {
        let well_formed = raw.get("type").is_some_and(Value::is_string)
            && raw.get("timestamp").is_some_and(Value::is_number);

        if !well_formed {
            return Err(Error::invalid_envelope(raw.to_string()));
        }

        let received = raw.to_string();
        serde_json::from_value(raw).map_err(|_| Error::invalid_envelope(received))
    }

    /// Encodes the envelope for a transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be represented.
    pub fn to_wire(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `data` does not match `T`.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.data)?)
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// MessageSender
// ============================================================================

/// Identity of the context that sent a runtime message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    /// Extension ID of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// URL of the sending page or script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Origin of the sending page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Tab the sender lives in (content scripts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<TabInfo>,

    /// Frame the sender lives in (content scripts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<FrameId>,
}

/// Tab details attached to a [`MessageSender`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    /// Tab ID.
    pub id: TabId,

    /// Current URL of the tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// ResponseWrapper
// ============================================================================

/// Outcome of invoking a handler, as sent back over the wire.
///
/// `err` is always a plain string because the wrapper itself must cross the
/// serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseWrapper {
    /// Handler returned a value.
    #[serde(rename = "res")]
    Res(Value),

    /// Handler failed.
    #[serde(rename = "err")]
    Err(String),
}

impl ResponseWrapper {
    /// Unwraps into the handler's value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the handler's message verbatim.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Res(value) => Ok(value),
            Self::Err(message) => Err(Error::remote(message)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
