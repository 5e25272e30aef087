//! Per-type listener table.
//!
//! Holds at most one handler per message type. Its size doubles as the
//! reference count for the root listener: the engine subscribes when it
//! grows from zero and unsubscribes when it shrinks back to zero.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::protocol::Message;

// ============================================================================
// Types
// ============================================================================

/// Type-erased handler: resolves to the JSON result or the error string.
pub type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, StdResult<Value, String>> + Send + Sync>;

struct Registration {
    id: ListenerId,
    handler: Handler,
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Map from message type to its single handler.
#[derive(Default)]
pub struct ListenerRegistry {
    handlers: FxHashMap<String, Registration>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `message_type` for `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateListener`] if the type is already claimed;
    /// the existing handler stays in place.
    pub fn register(&mut self, message_type: &str, handler: Handler) -> Result<ListenerId> {
        if self.handlers.contains_key(message_type) {
            return Err(Error::duplicate_listener(message_type));
        }

        let id = ListenerId::generate();
        self.handlers
            .insert(message_type.to_string(), Registration { id, handler });
        Ok(id)
    }

    /// Releases `message_type` if it is still held by registration `id`.
    pub fn unregister(&mut self, message_type: &str, id: ListenerId) -> bool {
        match self.handlers.get(message_type) {
            Some(registration) if registration.id == id => {
                self.handlers.remove(message_type);
                true
            }
            _ => false,
        }
    }

    /// Returns the handler for `message_type`.
    #[must_use]
    pub fn get(&self, message_type: &str) -> Option<Handler> {
        self.handlers
            .get(message_type)
            .map(|registration| Arc::clone(&registration.handler))
    }

    /// Removes every handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of registered handlers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Value) -> Handler {
        Arc::new(move |_| {
            let value = value.clone();
            Box::pin(async move { Ok(value) })
        })
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut registry = ListenerRegistry::new();
        registry
            .register("x", constant(Value::from(1)))
            .expect("first");

        let err = registry
            .register("x", constant(Value::from(2)))
            .expect_err("second");
        assert!(matches!(err, Error::DuplicateListener { ref message_type } if message_type == "x"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_id_does_not_unregister() {
        let mut registry = ListenerRegistry::new();
        let first = registry.register("x", constant(Value::Null)).expect("first");
        assert!(registry.unregister("x", first));

        let second = registry.register("x", constant(Value::Null)).expect("second");
        assert!(!registry.unregister("x", first));
        assert!(registry.get("x").is_some());
        assert!(registry.unregister("x", second));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut registry = ListenerRegistry::new();
        registry.register("a", constant(Value::Null)).expect("a");
        registry.register("b", constant(Value::Null)).expect("b");

        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
