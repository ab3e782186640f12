//! Connection options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use relay_link::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_reconnect_delay(Duration::from_secs(1))
//!     .with_max_pending(256);
//!
//! assert_eq!(options.max_pending, Some(256));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Delay between a session closing and the next open attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Upper bound on a single open attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Tunables of the connection engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Constant delay before every reconnect attempt.
    ///
    /// The first attempt is made immediately.
    pub reconnect_delay: Duration,

    /// Time allowed for one open attempt; `None` waits indefinitely.
    ///
    /// An attempt exceeding it counts as a pre-open failure.
    pub connect_timeout: Option<Duration>,

    /// Cap on simultaneously pending matchers; `None` is unbounded.
    pub max_pending: Option<usize>,
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            max_pending: None,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Bounds every open attempt by `timeout`.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Lets open attempts take as long as the transport needs.
    #[inline]
    #[must_use]
    pub const fn without_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Caps the number of pending matchers.
    #[inline]
    #[must_use]
    pub const fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = Some(max);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.max_pending, None);
        assert_eq!(options, ConnectionOptions::new());
    }

    #[test]
    fn test_builder_methods() {
        let options = ConnectionOptions::new()
            .with_reconnect_delay(Duration::from_millis(100))
            .without_connect_timeout()
            .with_max_pending(8);

        assert_eq!(options.reconnect_delay, Duration::from_millis(100));
        assert_eq!(options.connect_timeout, None);
        assert_eq!(options.max_pending, Some(8));
    }
}
