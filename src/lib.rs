//! Relay Link - Auto-reconnecting relay client with response matching.
//!
//! This library keeps one WebSocket connection to a relay alive and lets
//! callers correlate replies with the frames they send, even though the
//! wire protocol carries no request IDs.
//!
//! # Architecture
//!
//! - A single event loop task owns the session, the reconnect timer and
//!   the registry of pending matchers
//! - Every inbound frame is offered, in registration order, to every
//!   matcher waiting for its class (text or binary)
//! - A matcher settles its response by returning a value or an error;
//!   unmatched matchers stay pending and are never re-evaluated
//! - A closed session or failed attempt schedules a reconnect after a
//!   constant delay; pending matchers survive it
//!
//! # Quick Start
//!
//! ```no_run
//! use relay_link::{Connection, MatchResult, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::connect("wss://relay.example.com")?;
//!     connection.await_connected().await?;
//!
//!     let count = connection
//!         .request(json!(["PING", "abc"]), |frame| {
//!             match (frame.str_at(0), frame.str_at(1)) {
//!                 (Some("PONG"), Some("abc")) => MatchResult::Matched(frame.get(2).cloned()),
//!                 _ => MatchResult::NoMatch,
//!             }
//!         })
//!         .await?;
//!
//!     println!("PONG payload: {count:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`] handle, builder and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event`] | Relay events and the [`Signer`] seam |
//! | [`frame`] | Decoded [`Frame`]s and their classes |
//! | [`identifiers`] | Listener and session identifiers |
//! | [`matcher`] | [`MatchResult`], registry and [`PendingResponse`] |
//! | [`transport`] | Transport abstraction, WebSocket and in-memory |
//!
//! # Features
//!
//! - `tls`: enables `wss://` through rustls with WebPKI roots

// ============================================================================
// Modules
// ============================================================================

/// Auto-reconnecting connection.
///
/// Use [`Connection::connect`] or [`Connection::builder`] to start one.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Relay events and signing.
pub mod event;

/// Frame types.
pub mod frame;

/// Type-safe identifiers.
pub mod identifiers;

/// Response matching.
///
/// The registry here is driven by the connection's event loop but can be
/// used on its own.
pub mod matcher;

/// Transport layer.
///
/// [`Transport`](transport::Transport) opens sessions; the connection
/// never talks to sockets directly.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionOptions, ConnectionState, FrameObserver,
};

// Error types
pub use error::{Error, Result};

// Event types
pub use event::{SignedEvent, Signer, UnsignedEvent};

// Frame types
pub use frame::{Direction, Frame, FrameClass};

// Identifier types
pub use identifiers::{Generation, ListenerId};

// Matcher types
pub use matcher::{DispatchSummary, MatchResult, MatcherRegistry, PendingResponse};

// Transport types
pub use transport::{MemoryTransport, Transport, WebSocketTransport};
