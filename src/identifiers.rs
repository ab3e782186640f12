//! Type-safe identifiers.
//!
//! Newtype wrappers keep listener IDs and session generations from being
//! mixed up with plain counters.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// ListenerId
// ============================================================================

/// Source of process-wide unique listener IDs.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one pending matcher.
///
/// Allocated when the matcher is created, used to cancel it or to
/// report which listener timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates a fresh, never reused ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Counts transport sessions.
///
/// Bumped every time a new readiness future is created, that is once per
/// open attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// The generation before the first attempt.
    pub const ZERO: Self = Self(0);

    /// Returns the generation that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_listener_id_display() {
        assert_eq!(ListenerId::from_raw(42).to_string(), "listener-42");
    }

    #[test]
    fn test_generation_next() {
        let first = Generation::ZERO.next();
        assert_eq!(first.as_u64(), 1);
        assert_eq!(first.next().to_string(), "#2");
    }
}
