//! Connection handle.
//!
//! [`Connection`] is the only type application code needs. It is cheap to
//! clone; every clone talks to the same event loop.
//!
//! # Example
//!
//! ```no_run
//! use relay_link::{Connection, FrameClass, MatchResult, Result};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let connection = Connection::connect("ws://127.0.0.1:7000")?;
//! connection.await_connected().await?;
//!
//! let count = connection
//!     .send_request(json!(["PING", "abc"]), FrameClass::Text, |frame| {
//!         match (frame.str_at(0), frame.str_at(1)) {
//!             (Some("PONG"), Some("abc")) => MatchResult::Matched(frame.get(2).cloned()),
//!             _ => MatchResult::NoMatch,
//!         }
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameClass};
use crate::identifiers::Generation;
use crate::matcher::listener::{Canceller, pending_matcher};
use crate::matcher::{MatchResult, PendingResponse};
use crate::transport::Transport;

use super::builder::ConnectionBuilder;
use super::event_loop::{EventLoop, FrameObserver, LoopCommand, SendReply, SharedObserver};
use super::options::ConnectionOptions;
use super::readiness::{self, ConnectionState, Readiness};

// ============================================================================
// Connection
// ============================================================================

/// Handle to an auto-reconnecting relay connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// Registration and sends are queued to the event loop in call order.
pub struct Connection {
    /// Endpoint the event loop connects to.
    endpoint: Url,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<LoopCommand>,
    /// Latest readiness published by the event loop.
    readiness: watch::Receiver<Readiness>,
    /// Number of pending matchers (written by the event loop).
    pending: Arc<AtomicUsize>,
    /// Frame observer (shared with the event loop).
    observer: SharedObserver,
    /// Optional cap on pending matchers.
    max_pending: Option<usize>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            command_tx: self.command_tx.clone(),
            readiness: self.readiness.clone(),
            pending: Arc::clone(&self.pending),
            observer: Arc::clone(&self.observer),
            max_pending: self.max_pending,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates a builder for a custom configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connects to `url` with default options.
    ///
    /// Returns as soon as the first open attempt has started; use
    /// [`await_connected`](Self::await_connected) to wait for it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `url` does not parse
    /// - [`Error::Config`] if the scheme is not `ws` or `wss`
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn connect(url: &str) -> Result<Self> {
        Self::builder().url(url).connect()
    }

    /// Spawns the event loop and returns the first handle.
    pub(crate) fn spawn(
        endpoint: Url,
        options: ConnectionOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (readiness_tx, readiness_rx) = readiness::channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let observer: SharedObserver = Arc::new(Mutex::new(None));
        let max_pending = options.max_pending;

        let event_loop = EventLoop::new(
            transport,
            endpoint.clone(),
            options,
            command_rx,
            readiness_tx,
            Arc::clone(&pending),
            Arc::clone(&observer),
        );
        tokio::spawn(event_loop.run());

        Self {
            endpoint,
            command_tx,
            readiness: readiness_rx,
            pending,
            observer,
            max_pending,
        }
    }
}

// ============================================================================
// Connection - State
// ============================================================================

impl Connection {
    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.readiness.borrow().state
    }

    /// Returns the current session generation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.readiness.borrow().generation
    }

    /// Returns `true` while a session is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the number of pending matchers.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Waits until a session is open.
    ///
    /// Resolves immediately when already open. During a reconnect gap it
    /// waits for the next session instead.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the attempt pending at call time failed
    /// - [`Error::ConnectionClosed`] if the connection was shut down
    pub async fn await_connected(&self) -> Result<()> {
        readiness::wait_open(self.readiness.clone()).await
    }
}

// ============================================================================
// Connection - Messaging
// ============================================================================

impl Connection {
    /// Sends a frame without waiting for a response.
    ///
    /// Values become text frames, byte buffers binary frames.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no session is open
    /// - [`Error::ConnectionClosed`] if the connection was shut down
    /// - [`Error::Json`] if the frame cannot be encoded
    /// - transport errors if the write fails
    pub async fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        let (ack, done) = oneshot::channel();

        self.command_tx
            .send(LoopCommand::Send {
                frame: frame.into(),
                reply: SendReply::Ack(ack),
            })
            .map_err(|_| Error::ConnectionClosed)?;

        done.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends a frame and waits for the frame `matcher` claims.
    ///
    /// The matcher is registered before the frame is written, so a reply
    /// arriving right after the write cannot be missed. It only sees frames
    /// of `class`.
    ///
    /// The returned response fails immediately with
    /// [`Error::NotConnected`] when no session is open, or
    /// [`Error::TooManyPending`] when the configured cap is reached.
    pub fn send_request<T, F>(
        &self,
        frame: impl Into<Frame>,
        class: FrameClass,
        matcher: F,
    ) -> PendingResponse<T>
    where
        T: Send + 'static,
        F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
    {
        self.submit(Some(frame.into()), class, matcher)
    }

    /// Sends a frame and waits for a text frame `matcher` claims.
    ///
    /// Shorthand for [`send_request`](Self::send_request) with
    /// [`FrameClass::Text`].
    pub fn request<T, F>(&self, frame: impl Into<Frame>, matcher: F) -> PendingResponse<T>
    where
        T: Send + 'static,
        F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
    {
        self.send_request(frame, FrameClass::Text, matcher)
    }

    /// Waits for a frame `matcher` claims, without sending anything.
    ///
    /// Registration is queued in call order with sends, so calling this
    /// before [`send_request`](Self::send_request) guarantees the matcher
    /// is in place for every reply to that request. Unlike sends, a
    /// registration made while disconnected stays pending across the
    /// reconnect.
    pub fn wait_for<T, F>(&self, class: FrameClass, matcher: F) -> PendingResponse<T>
    where
        T: Send + 'static,
        F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
    {
        self.submit(None, class, matcher)
    }

    /// Queues a listener, optionally paired with a frame to send.
    fn submit<T, F>(&self, frame: Option<Frame>, class: FrameClass, matcher: F) -> PendingResponse<T>
    where
        T: Send + 'static,
        F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
    {
        if let Err(e) = self.check_capacity() {
            return PendingResponse::failed(e);
        }

        let (listener, response) = pending_matcher(class, matcher);
        let command = match frame {
            Some(frame) => LoopCommand::Send {
                frame,
                reply: SendReply::Response(listener),
            },
            None => LoopCommand::Register(listener),
        };

        if self.command_tx.send(command).is_err() {
            return PendingResponse::failed(Error::ConnectionClosed);
        }

        response.with_canceller(self.canceller())
    }

    /// Rejects new matchers once `max_pending` is reached.
    ///
    /// The count lags behind queued registrations; the event loop enforces
    /// the cap again when it registers.
    fn check_capacity(&self) -> Result<()> {
        if let Some(max) = self.max_pending {
            let pending = self.pending_count();
            if pending >= max {
                warn!(pending, max, "Too many pending matchers");
                return Err(Error::too_many_pending(pending, max));
            }
        }
        Ok(())
    }

    /// Builds the callback that cancels a listener on this event loop.
    fn canceller(&self) -> Canceller {
        let command_tx = self.command_tx.clone();
        Arc::new(move |id| {
            let _ = command_tx.send(LoopCommand::Cancel(id));
        })
    }
}

// ============================================================================
// Connection - Observer & Lifecycle
// ============================================================================

impl Connection {
    /// Sets the frame observer.
    ///
    /// The observer runs on the event loop for every frame sent and
    /// received; keep it short. It may replace or clear itself. A panicking
    /// observer is logged and ignored.
    pub fn set_frame_observer(&self, observer: FrameObserver) {
        *self.observer.lock() = Some(Arc::from(observer));
    }

    /// Removes the frame observer.
    pub fn clear_frame_observer(&self) {
        *self.observer.lock() = None;
    }

    /// Stops the event loop.
    ///
    /// Closes the current session, cancels any scheduled reconnect and
    /// fails every pending matcher with [`Error::ConnectionClosed`].
    /// Affects all clones of this handle.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(LoopCommand::Shutdown);
    }
}

// ============================================================================
// Tests
// ============================================================================
