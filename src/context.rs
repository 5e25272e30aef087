//! Execution context detection.
//!
//! The RPC layer needs to know, at lookup time, whether the current context
//! is the one holding real service objects. Detection is environment
//! specific, so it is a trait; [`ExtensionContext`] itself implements it for
//! contexts that know statically where they run.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ExtensionContext
// ============================================================================

/// Isolated execution environment inside an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionContext {
    /// Background page or service worker.
    Background,

    /// Content script running in a web page's isolated world.
    ContentScript,

    /// Extension-owned page (popup, options, side panel).
    ExtensionPage,

    /// Script injected into a web page's main world.
    InjectedScript,
}

impl ExtensionContext {
    /// Returns the context's name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::ContentScript => "content-script",
            Self::ExtensionPage => "extension-page",
            Self::InjectedScript => "injected-script",
        }
    }

    /// Returns `true` if the context can use the extension runtime channel.
    #[inline]
    #[must_use]
    pub const fn has_runtime(self) -> bool {
        !matches!(self, Self::InjectedScript)
    }
}

impl fmt::Display for ExtensionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ContextDetector
// ============================================================================

/// Decides which context the caller runs in.
pub trait ContextDetector: Send + Sync {
    /// Returns the current context.
    fn current(&self) -> ExtensionContext;

    /// Returns `true` in the context that owns real service objects.
    ///
    /// Defaults to the background context.
    fn is_real_context(&self) -> bool {
        self.current() == ExtensionContext::Background
    }
}

impl ContextDetector for ExtensionContext {
    fn current(&self) -> ExtensionContext {
        *self
    }
}

// ============================================================================
// Tests
// ============================================================================
