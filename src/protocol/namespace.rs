//! Namespace envelope for the broadcast-style transports.
//!
//! The window and custom-event transports share one channel with every other
//! messenger on the page, so each envelope carries a partition key and the
//! sender's instance identity.
//!
//! Request:
//! ```json
//! {
//!   "type": "REQUEST",
//!   "namespace": "extension-messaging",
//!   "instanceId": "5b0e...",
//!   "message": { "id": 1, "type": "ping", "data": null, "timestamp": 0 },
//!   "senderOrigin": "https://example.com"
//! }
//! ```
//!
//! Response:
//! ```json
//! {
//!   "type": "RESPONSE",
//!   "namespace": "extension-messaging",
//!   "instanceId": "9c41...",
//!   "message": { "id": 1, "type": "ping", "data": null, "timestamp": 0 },
//!   "response": { "res": "pong" }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::InstanceId;

use super::ResponseWrapper;

// ============================================================================
// NamespaceEnvelope
// ============================================================================

/// Wire record of the window and custom-event transports.
///
/// `message` stays raw JSON so the receiving engine can validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NamespaceEnvelope {
    /// Outbound call.
    #[serde(rename = "REQUEST", rename_all = "camelCase")]
    Request {
        /// Partition key.
        namespace: String,
        /// Sender's instance identity.
        instance_id: InstanceId,
        /// Envelope being sent.
        message: Value,
        /// Origin replies should be addressed to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_origin: Option<String>,
    },

    /// Reply to a call.
    #[serde(rename = "RESPONSE", rename_all = "camelCase")]
    Response {
        /// Partition key.
        namespace: String,
        /// Responder's instance identity.
        instance_id: InstanceId,
        /// Echo of the request envelope.
        message: Value,
        /// Handler outcome, absent when nothing answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseWrapper>,
    },
}

impl NamespaceEnvelope {
    /// Decodes a broadcast payload, returning `None` for foreign traffic.
    #[must_use]
    pub fn decode(data: &Value) -> Option<Self> {
        Self::deserialize(data).ok()
    }

    /// Returns the partition key.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Request { namespace, .. } | Self::Response { namespace, .. } => namespace,
        }
    }

    /// Returns the instance identity of whoever broadcast this envelope.
    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Self::Request { instance_id, .. } | Self::Response { instance_id, .. } => instance_id,
        }
    }

    /// Returns the `type` field of the carried message, if present.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        let message = match self {
            Self::Request { message, .. } | Self::Response { message, .. } => message,
        };
        message.get("type").and_then(Value::as_str)
    }

    /// Returns `true` if the envelope belongs to `namespace` and was broadcast
    /// by someone other than `own`.
    #[inline]
    #[must_use]
    pub fn is_peer_of(&self, namespace: &str, own: &InstanceId) -> bool {
        self.namespace() == namespace && self.instance_id() != own
    }
}

// ============================================================================
// Tests
// ============================================================================
