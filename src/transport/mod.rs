//! Transport layer.
//!
//! The connection engine does not talk to sockets directly. It opens
//! sessions through a [`Transport`] and exchanges [`WireFrame`]s with the
//! resulting [`Session`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        open()         ┌─────────────────┐
//! │  Event loop      │──────────────────────►│  Transport      │
//! │  (reconnector +  │                       └────────┬────────┘
//! │   dispatcher)    │   send() / recv()     ┌────────▼────────┐
//! │                  │◄─────────────────────►│  Session        │◄──► relay
//! └──────────────────┘                       └─────────────────┘
//! ```
//!
//! A session is used by exactly one event loop generation and discarded
//! once it closes; the next attempt opens a fresh one.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` client transport |
//! | `memory` | In-process transport for tests and simulations |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryRelay, MemoryTransport, PendingOpen};
pub use websocket::WebSocketTransport;

// ============================================================================
// WireFrame
// ============================================================================

/// A frame as tagged by the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl WireFrame {
    /// Returns the frame length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` for a zero-length frame.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Opens sessions to an endpoint.
///
/// `open` completing with `Ok` is the session's open event, `Err` is its
/// pre-open error event.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a new session to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be established.
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn Session>>;
}

// ============================================================================
// Session
// ============================================================================

/// One open bidirectional message channel.
///
/// # Cancel Safety
///
/// [`recv`](Session::recv) is polled inside `tokio::select!` and must be
/// cancel-safe: dropping an unfinished call must not lose a frame.
#[async_trait]
pub trait Session: Send + 'static {
    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    async fn send(&mut self, frame: WireFrame) -> Result<()>;

    /// Waits for the next inbound frame.
    ///
    /// Returns `None` once the session is closed, `Some(Err(_))` on a
    /// transport failure. Both end the session.
    async fn recv(&mut self) -> Option<Result<WireFrame>>;

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
