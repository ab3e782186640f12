//! Connection readiness.
//!
//! The event loop publishes a [`Readiness`] snapshot through a `watch`
//! channel. Each snapshot names the current session generation; a new
//! generation starts the moment a session closes or fails to open, which is
//! the point where a fresh readiness future replaces the old one.
//!
//! A waiter remembers the generation current when it started waiting and
//! resolves when:
//!
//! - any session is open (`Ok`)
//! - the generation it waited on failed to open (`Err`)
//! - the event loop stopped (`Err(ConnectionClosed)`)

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::identifiers::Generation;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// An open attempt is in progress.
    Connecting,
    /// A session is open; sends are accepted.
    Open,
    /// Waiting out the reconnect delay.
    Reconnecting,
    /// Shut down; no further attempts.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// Snapshot published by the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Readiness {
    /// Generation of the current readiness future.
    pub generation: Generation,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Most recent pre-open failure and the generation it rejected.
    pub last_failure: Option<(Generation, OpenFailure)>,
}

impl Readiness {
    /// State before the first attempt completes.
    pub fn initial() -> Self {
        Self {
            generation: Generation::ZERO.next(),
            state: ConnectionState::Connecting,
            last_failure: None,
        }
    }

    /// The current session opened.
    pub fn opened(&mut self) {
        self.state = ConnectionState::Open;
    }

    /// The current session closed; start the next generation.
    pub fn closed(&mut self) {
        self.generation = self.generation.next();
        self.state = ConnectionState::Reconnecting;
    }

    /// The current attempt failed before opening; reject it and start the
    /// next generation.
    pub fn failed(&mut self, error: &Error) {
        self.last_failure = Some((self.generation, OpenFailure::from_error(error)));
        self.closed();
    }

    /// The reconnect delay elapsed and a new attempt begins.
    pub fn attempting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// The event loop stopped.
    pub fn shut_down(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

// ============================================================================
// OpenFailure
// ============================================================================

/// Pre-open failure as replayed to readiness waiters.
///
/// [`Error`] is not `Clone`, so only its category and message are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OpenFailure {
    /// The attempt exceeded the connect timeout.
    TimedOut { timeout_ms: u64 },
    /// Any other failure before the session opened.
    Failed { message: String },
}

impl OpenFailure {
    /// Captures the category of `error`.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::ConnectionTimeout { timeout_ms } => Self::TimedOut {
                timeout_ms: *timeout_ms,
            },
            Error::Connection { message } => Self::Failed {
                message: message.clone(),
            },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }

    /// Rebuilds the error handed to a waiter.
    pub fn to_error(&self) -> Error {
        match self {
            Self::TimedOut { timeout_ms } => Error::connection_timeout(*timeout_ms),
            Self::Failed { message } => Error::connection(message.clone()),
        }
    }
}

/// Creates the readiness channel.
pub(crate) fn channel() -> (watch::Sender<Readiness>, watch::Receiver<Readiness>) {
    watch::channel(Readiness::initial())
}

// ============================================================================
// Waiting
// ============================================================================

/// Waits until a session is open, against the latest readiness.
///
/// # Errors
///
/// - [`Error::Connection`] or [`Error::ConnectionTimeout`] if the
///   generation current at call time failed to open
/// - [`Error::ConnectionClosed`] if the event loop stopped
pub(crate) async fn wait_open(mut readiness: watch::Receiver<Readiness>) -> Result<()> {
    let target = readiness.borrow().generation;

    loop {
        {
            let current = readiness.borrow_and_update();
            match current.state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closed => return Err(Error::ConnectionClosed),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if let Some((generation, failure)) = &current.last_failure
                && *generation >= target
            {
                return Err(failure.to_error());
            }
        }

        readiness
            .changed()
            .await
            .map_err(|_| Error::ConnectionClosed)?;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_transitions() {
        let mut readiness = Readiness::initial();
        assert_eq!(readiness.generation.as_u64(), 1);

        readiness.failed(&Error::connection("refused"));
        assert_eq!(readiness.generation.as_u64(), 2);
        assert_eq!(readiness.state, ConnectionState::Reconnecting);
        assert_eq!(
            readiness.last_failure,
            Some((
                Generation::ZERO.next(),
                OpenFailure::Failed {
                    message: "refused".to_string()
                }
            ))
        );

        readiness.attempting();
        readiness.opened();
        assert_eq!(readiness.state, ConnectionState::Open);

        readiness.closed();
        assert_eq!(readiness.generation.as_u64(), 3);
    }

    #[test]
    fn test_wait_resolves_on_open() {
        let (tx, rx) = channel();
        let mut waiter = task::spawn(wait_open(rx));

        assert_pending!(waiter.poll());
        tx.send_modify(Readiness::opened);
        assert!(waiter.is_woken());
        assert!(assert_ready!(waiter.poll()).is_ok());
    }

    #[test]
    fn test_wait_rejected_by_failure_of_its_generation() {
        let (tx, rx) = channel();
        let mut waiter = task::spawn(wait_open(rx));

        assert_pending!(waiter.poll());
        tx.send_modify(|r| r.failed(&Error::connection("refused")));

        match assert_ready!(waiter.poll()) {
            Err(Error::Connection { message }) => assert_eq!(message, "refused"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_wait_started_after_failure_waits_for_next_open() {
        let (tx, rx) = channel();
        tx.send_modify(|r| r.failed(&Error::connection("refused")));

        let mut waiter = task::spawn(wait_open(rx));
        assert_pending!(waiter.poll());

        tx.send_modify(Readiness::attempting);
        assert_pending!(waiter.poll());

        tx.send_modify(Readiness::opened);
        assert!(assert_ready!(waiter.poll()).is_ok());
    }

    #[test]
    fn test_wait_keeps_timeout_category() {
        let (tx, rx) = channel();
        let mut waiter = task::spawn(wait_open(rx));

        assert_pending!(waiter.poll());
        tx.send_modify(|r| r.failed(&Error::connection_timeout(1000)));

        let error = assert_ready!(waiter.poll()).unwrap_err();
        assert!(matches!(error, Error::ConnectionTimeout { timeout_ms: 1000 }));
        assert!(error.is_timeout());
    }

    #[test]
    fn test_wait_fails_when_loop_stops() {
        let (tx, rx) = channel();
        let mut waiter = task::spawn(wait_open(rx));
        assert_pending!(waiter.poll());

        drop(tx);
        assert!(matches!(
            assert_ready!(waiter.poll()),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_wait_fails_on_shutdown() {
        let (tx, rx) = channel();
        tx.send_modify(Readiness::shut_down);
        let mut waiter = task::spawn(wait_open(rx));
        assert!(matches!(
            assert_ready!(waiter.poll()),
            Err(Error::ConnectionClosed)
        ));
    }
}
