//! Messenger configuration and diagnostic logging.
//!
//! # Example
//!
//! ```ignore
//! use extension_messaging::{MessengerConfig, NamespaceConfig};
//!
//! let config = MessengerConfig::new().with_tracing_logger();
//! let window = NamespaceConfig::new("my-extension").with_messenger(config);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

// ============================================================================
// Constants
// ============================================================================

/// Namespace used by the broadcast transports when none is configured.
pub const DEFAULT_NAMESPACE: &str = "extension-messaging";

// ============================================================================
// Logger
// ============================================================================

/// Leveled diagnostic sink for message tracing.
pub trait Logger: Send + Sync {
    /// Per-message trace output.
    fn debug(&self, args: fmt::Arguments<'_>);

    /// Informational output.
    fn log(&self, args: fmt::Arguments<'_>);

    /// Recoverable problems.
    fn warn(&self, args: fmt::Arguments<'_>);

    /// Protocol errors.
    fn error(&self, args: fmt::Arguments<'_>);
}

/// [`Logger`] that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        debug!(target: "extension_messaging", "{args}");
    }

    fn log(&self, args: fmt::Arguments<'_>) {
        info!(target: "extension_messaging", "{args}");
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        warn!(target: "extension_messaging", "{args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        error!(target: "extension_messaging", "{args}");
    }
}

// ============================================================================
// MessengerConfig
// ============================================================================

/// Options shared by every transport.
#[derive(Clone, Default)]
pub struct MessengerConfig {
    /// Sink for send/receive tracing. `None` traces nothing per message.
    pub logger: Option<Arc<dyn Logger>>,

    /// Silently ignore malformed inbound envelopes instead of raising.
    pub break_error: bool,
}

impl MessengerConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the diagnostic logger.
    #[inline]
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Routes diagnostic output through `tracing`.
    #[inline]
    #[must_use]
    pub fn with_tracing_logger(self) -> Self {
        self.with_logger(Arc::new(TracingLogger))
    }

    /// Sets whether malformed envelopes are ignored silently.
    #[inline]
    #[must_use]
    pub fn with_break_error(mut self, break_error: bool) -> Self {
        self.break_error = break_error;
        self
    }
}

impl fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("logger", &self.logger.is_some())
            .field("break_error", &self.break_error)
            .finish()
    }
}

// ============================================================================
// NamespaceConfig
// ============================================================================

/// Options for the window and custom-event transports.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    /// Partition key separating unrelated messengers on the same channel.
    pub namespace: String,

    /// Engine options.
    pub messenger: MessengerConfig,
}

impl NamespaceConfig {
    /// Creates a configuration for `namespace`.
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            messenger: MessengerConfig::default(),
        }
    }

    /// Sets the engine options.
    #[inline]
    #[must_use]
    pub fn with_messenger(mut self, messenger: MessengerConfig) -> Self {
        self.messenger = messenger;
        self
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace() {
        assert_eq!(NamespaceConfig::default().namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_builder() {
        let config = MessengerConfig::new()
            .with_tracing_logger()
            .with_break_error(true);

        assert!(config.logger.is_some());
        assert!(config.break_error);
    }
}
