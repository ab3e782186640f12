//! Error types for relay-link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use relay_link::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     connection.await_connected().await?;
//!     connection.send(serde_json::json!(["CLOSE", "sub"])).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`] |
//! | Protocol | [`Error::Protocol`] |
//! | Correlation | [`Error::Matcher`], [`Error::MatcherPanicked`], [`Error::RequestTimeout`], [`Error::Cancelled`], [`Error::TooManyPending`] |
//! | Signing | [`Error::Signing`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ListenerId;

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
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Opening a transport session failed.
    ///
    /// Rejects the readiness of the session generation that failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An open attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection was shut down.
    ///
    /// Returned to every waiter still pending when the event loop stops.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame was sent while no session was open.
    ///
    /// Sends are never queued across a reconnect.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame could not be decoded.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// A matcher rejected the frame it claimed.
    ///
    /// Produced by caller-supplied matchers through `MatchResult::Failed`.
    #[error("Matcher failed: {message}")]
    Matcher {
        /// Description supplied by the matcher.
        message: String,
    },

    /// A matcher panicked while being evaluated.
    #[error("Matcher {listener_id} panicked: {message}")]
    MatcherPanicked {
        /// The listener whose matcher panicked.
        listener_id: ListenerId,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// A pending response was not matched in time.
    #[error("Listener {listener_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The listener that timed out.
        listener_id: ListenerId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A pending response was cancelled by its owner.
    #[error("Listener {listener_id} cancelled")]
    Cancelled {
        /// The cancelled listener.
        listener_id: ListenerId,
    },

    /// Registering another matcher would exceed the configured cap.
    #[error("Too many pending matchers: {pending}/{max}")]
    TooManyPending {
        /// Matchers currently pending.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    // ========================================================================
    // Signing Errors
    // ========================================================================
    /// Event signing failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a matcher error.
    ///
    /// Matchers return this through `MatchResult::Failed` to settle their
    /// response as a failure.
    #[inline]
    pub fn matcher(message: impl Into<String>) -> Self {
        Self::Matcher {
            message: message.into(),
        }
    }

    /// Creates a matcher panic error.
    #[inline]
    pub fn matcher_panicked(listener_id: ListenerId, message: impl Into<String>) -> Self {
        Self::MatcherPanicked {
            listener_id,
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(listener_id: ListenerId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            listener_id,
            timeout_ms,
        }
    }

    /// Creates a cancellation error.
    #[inline]
    pub fn cancelled(listener_id: ListenerId) -> Self {
        Self::Cancelled { listener_id }
    }

    /// Creates a too-many-pending error.
    #[inline]
    pub fn too_many_pending(pending: usize, max: usize) -> Self {
        Self::TooManyPending { pending, max }
    }

    /// Creates a signing error.
    #[inline]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came from a matcher.
    #[inline]
    #[must_use]
    pub fn is_matcher_error(&self) -> bool {
        matches!(self, Self::Matcher { .. } | Self::MatcherPanicked { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when re-issued after the connection
    /// comes back.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::NotConnected
                | Self::RequestTimeout { .. }
                | Self::TooManyPending { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
