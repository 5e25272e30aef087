//! Type-checked protocol map.
//!
//! Each message type is declared once as a zero-sized marker implementing
//! [`ProtocolMessage`]; `Messenger::send` and `Messenger::on` then enforce the
//! payload and return types at compile time.
//!
//! ```ignore
//! struct GetLength;
//!
//! impl ProtocolMessage for GetLength {
//!     const TYPE: &'static str = "getLength";
//!     type Data = String;
//!     type Return = usize;
//! }
//!
//! messenger.on::<GetLength, _, _, _>(|request| async move {
//!     Ok::<_, String>(request.data.len())
//! })?;
//! let length = messenger.send::<GetLength>("test".into(), None).await?;
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::identifiers::MessageId;

use super::MessageSender;

// ============================================================================
// ProtocolMessage
// ============================================================================

/// One entry of a messaging protocol.
pub trait ProtocolMessage: Send + Sync + 'static {
    /// Wire `type` of the message.
    const TYPE: &'static str;

    /// Payload sent by the caller.
    type Data: Serialize + DeserializeOwned + Send + 'static;

    /// Value returned by the handler.
    type Return: Serialize + DeserializeOwned + Send + 'static;
}

// ============================================================================
// Incoming
// ============================================================================

/// Decoded view of an inbound message handed to typed handlers.
#[derive(Debug, Clone)]
pub struct Incoming<D> {
    /// Envelope ID.
    pub id: MessageId,

    /// Decoded payload.
    pub data: D,

    /// Send time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Sender identity (runtime transport only).
    pub sender: Option<MessageSender>,
}
