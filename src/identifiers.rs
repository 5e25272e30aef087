//! Type-safe identifiers for messaging entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`MessageId`] | Per-context envelope counter value |
//! | [`InstanceId`] | Random per-messenger identity for self-echo suppression |
//! | [`TabId`] | Browser tab addressed by the runtime transport |
//! | [`FrameId`] | Frame inside a tab (0 = main frame) |
//! | [`ListenerId`] | Registration token for one handler |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound (exclusive) for the random seed of a [`MessageIdGenerator`].
const MESSAGE_ID_SEED_RANGE: u64 = 10_000;

// ============================================================================
// MessageId
// ============================================================================

/// Envelope identifier.
///
/// Locally unique and increasing within one generator. Collisions across
/// contexts are expected; correlation never relies on the id alone.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a message ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MessageIdGenerator
// ============================================================================

/// Monotonic counter seeded randomly on creation.
#[derive(Debug)]
pub struct MessageIdGenerator {
    next: AtomicU64,
}

impl MessageIdGenerator {
    /// Creates a generator with a random seed in `0..10_000`.
    #[must_use]
    pub fn new() -> Self {
        let seed = (Uuid::new_v4().as_u128() as u64) % MESSAGE_ID_SEED_RANGE;
        Self::with_seed(seed)
    }

    /// Creates a generator starting right after `seed`.
    #[inline]
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Returns the next message ID.
    #[inline]
    pub fn next_id(&self) -> MessageId {
        MessageId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// InstanceId
// ============================================================================

/// Random identity of one messenger instance.
///
/// Only used to recognise and ignore one's own broadcasts. Never used to
/// route to a specific peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generates a fresh random instance ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TabId
// ============================================================================

/// Browser tab identifier (always positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(NonZeroU32);

impl TabId {
    /// Creates a tab ID, returning `None` for zero.
    #[inline]
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// FrameId
// ============================================================================

/// Frame identifier within a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(u64);

impl FrameId {
    /// Creates a frame ID.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The top-level frame of a tab.
    #[inline]
    #[must_use]
    pub const fn main() -> Self {
        Self(0)
    }

    /// Returns `true` for the top-level frame.
    #[inline]
    #[must_use]
    pub const fn is_main(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Token identifying one handler registration.
///
/// Lets a stale removal handle tell its own registration apart from a later
/// one for the same message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generates a process-unique listener ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_increase() {
        let generator = MessageIdGenerator::with_seed(41);
        assert_eq!(generator.next_id(), MessageId::new(42));
        assert_eq!(generator.next_id(), MessageId::new(43));
    }

    #[test]
    fn test_random_seed_in_range() {
        let generator = MessageIdGenerator::new();
        let first = generator.next_id().as_u64();
        assert!(first >= 1 && first <= MESSAGE_ID_SEED_RANGE);
    }

    #[test]
    fn test_instance_ids_differ() {
        assert_ne!(InstanceId::generate(), InstanceId::generate());
    }

    #[test]
    fn test_tab_id_rejects_zero() {
        assert!(TabId::new(0).is_none());
        assert_eq!(TabId::new(7).map(TabId::as_u32), Some(7));
    }

    #[test]
    fn test_frame_id_main() {
        assert!(FrameId::main().is_main());
        assert!(!FrameId::new(3).is_main());
    }

    #[test]
    fn test_listener_ids_unique() {
        assert_ne!(ListenerId::generate(), ListenerId::generate());
    }
}
