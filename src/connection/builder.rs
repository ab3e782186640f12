//! Connection builder.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use relay_link::{Connection, Result};
//!
//! # async fn example() -> Result<()> {
//! let connection = Connection::builder()
//!     .url("wss://relay.example.com")
//!     .reconnect_delay(Duration::from_secs(2))
//!     .max_pending(1024)
//!     .connect()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Transport, WebSocketTransport};

use super::core::Connection;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for [`Connection`].
#[derive(Default)]
pub struct ConnectionBuilder {
    url: Option<String>,
    options: ConnectionOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionBuilder {
    /// Sets the relay endpoint.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces all options at once.
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the delay before every reconnect attempt.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    /// Bounds every open attempt by `timeout`.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    /// Removes the bound on open attempts.
    #[must_use]
    pub fn no_connect_timeout(mut self) -> Self {
        self.options.connect_timeout = None;
        self
    }

    /// Caps the number of pending matchers.
    #[must_use]
    pub fn max_pending(mut self, max: usize) -> Self {
        self.options.max_pending = Some(max);
        self
    }

    /// Uses a custom transport instead of WebSocket.
    ///
    /// With a custom transport the URL scheme is not checked.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

// ============================================================================
// Build
// ============================================================================

impl ConnectionBuilder {
    /// Validates the configuration and starts the event loop.
    ///
    /// The first open attempt starts immediately; this does not wait for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no URL was set, the scheme is not `ws`/`wss`,
    ///   or `max_pending` is zero
    /// - [`Error::InvalidUrl`] if the URL does not parse
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn connect(self) -> Result<Connection> {
        let url = self.url.ok_or_else(|| Error::config("relay URL is required"))?;
        let endpoint = Url::parse(&url)?;

        if self.transport.is_none() && !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme '{}', expected ws or wss",
                endpoint.scheme()
            )));
        }

        if self.options.max_pending == Some(0) {
            return Err(Error::config("max_pending must be at least 1"));
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        Ok(Connection::spawn(endpoint, self.options, transport))
    }
}

// ============================================================================
// Tests
// ============================================================================
