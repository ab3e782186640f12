//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns a transport and the [`MemoryRelay`]
//! standing in for the server. Every open attempt shows up on the relay as
//! a [`PendingOpen`], which is either accepted (yielding a [`MemoryPeer`])
//! or refused. Dropping a peer closes the client's session.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut relay) = MemoryTransport::pair();
//! let connection = Connection::builder()
//!     .url("ws://relay.test")
//!     .transport(Arc::new(transport))
//!     .connect()?;
//!
//! let mut peer = relay.accept().await.expect("open attempt");
//! connection.await_connected().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::frame::Frame;

use super::{Session, Transport, WireFrame};

// ============================================================================
// Types
// ============================================================================

/// Answer to an open attempt: a session or a refusal reason.
type OpenReply = std::result::Result<MemorySession, String>;

// ============================================================================
// MemoryTransport
// ============================================================================

/// Client side of an in-process relay.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    attempts: mpsc::UnboundedSender<PendingOpen>,
}

impl MemoryTransport {
    /// Creates a transport and the relay receiving its open attempts.
    #[must_use]
    pub fn pair() -> (Self, MemoryRelay) {
        let (attempts, incoming) = mpsc::unbounded_channel();
        (Self { attempts }, MemoryRelay { incoming })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn Session>> {
        let (reply, answer) = oneshot::channel();
        self.attempts
            .send(PendingOpen {
                endpoint: endpoint.clone(),
                reply,
            })
            .map_err(|_| Error::connection("memory relay is gone"))?;

        match answer.await {
            Ok(Ok(session)) => Ok(Box::new(session)),
            Ok(Err(reason)) => Err(Error::connection(reason)),
            Err(_) => Err(Error::connection("open attempt dropped by relay")),
        }
    }
}

// ============================================================================
// MemoryRelay
// ============================================================================

/// Server side of an in-process relay.
#[derive(Debug)]
pub struct MemoryRelay {
    incoming: mpsc::UnboundedReceiver<PendingOpen>,
}

impl MemoryRelay {
    /// Waits for the next open attempt.
    ///
    /// Returns `None` once every transport handle is dropped.
    pub async fn next_open(&mut self) -> Option<PendingOpen> {
        self.incoming.recv().await
    }

    /// Waits for the next open attempt and accepts it.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        Some(self.next_open().await?.accept())
    }
}

// ============================================================================
// PendingOpen
// ============================================================================

/// An open attempt waiting for the relay's answer.
#[derive(Debug)]
pub struct PendingOpen {
    endpoint: Url,
    reply: oneshot::Sender<OpenReply>,
}

impl PendingOpen {
    /// Returns the endpoint the client asked for.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Completes the attempt with an open session.
    #[must_use]
    pub fn accept(self) -> MemoryPeer {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();

        let session = MemorySession {
            inbound,
            outbound: Some(outbound),
        };

        if self.reply.send(Ok(session)).is_err() {
            debug!(endpoint = %self.endpoint, "Client gave up before the session opened");
        }

        MemoryPeer {
            to_client,
            from_client,
        }
    }

    /// Fails the attempt with a pre-open error.
    pub fn refuse(self, reason: impl Into<String>) {
        let _ = self.reply.send(Err(reason.into()));
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Relay end of one accepted session.
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<WireFrame>,
    from_client: mpsc::UnboundedReceiver<WireFrame>,
}

impl MemoryPeer {
    /// Sends a frame to the client.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame cannot be encoded
    /// - [`Error::ConnectionClosed`] if the client session is gone
    pub fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        self.send_wire(frame.into().encode()?)
    }

    /// Sends a raw wire frame, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client session is gone.
    pub fn send_wire(&self, frame: WireFrame) -> Result<()> {
        self.to_client
            .send(frame)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Waits for the next frame written by the client.
    ///
    /// Returns `None` once the client session is closed. Undecodable text
    /// is skipped.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match Frame::decode(self.from_client.recv().await?) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!(error = %e, "Client sent an undecodable frame"),
            }
        }
    }

    /// Returns `true` while the client session is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.to_client.is_closed()
    }

    /// Closes the session from the relay side.
    pub fn close(self) {
        drop(self);
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Client end of one accepted session.
#[derive(Debug)]
struct MemorySession {
    inbound: mpsc::UnboundedReceiver<WireFrame>,
    outbound: Option<mpsc::UnboundedSender<WireFrame>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn send(&mut self, frame: WireFrame) -> Result<()> {
        self.outbound
            .as_ref()
            .ok_or(Error::ConnectionClosed)?
            .send(frame)
            .map_err(|_| Error::connection("memory peer closed"))
    }

    async fn recv(&mut self) -> Option<Result<WireFrame>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn endpoint() -> Url {
        Url::parse("ws://relay.test").unwrap()
    }

    #[tokio::test]
    async fn test_accept_and_exchange() {
        let (transport, mut relay) = MemoryTransport::pair();

        let open = tokio::spawn(async move { transport.open(&endpoint()).await });
        let mut peer = relay.accept().await.expect("open attempt");
        let mut session = open.await.unwrap().expect("session");

        session
            .send(WireFrame::Text(r#"["PING","abc"]"#.into()))
            .await
            .unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text(json!(["PING", "abc"]))));

        peer.send(json!(["PONG", "abc", 42])).unwrap();
        assert_eq!(
            session.recv().await.unwrap().unwrap(),
            WireFrame::Text(r#"["PONG","abc",42]"#.into())
        );
    }

    #[tokio::test]
    async fn test_refuse() {
        let (transport, mut relay) = MemoryTransport::pair();

        let open = tokio::spawn(async move { transport.open(&endpoint()).await });
        let attempt = relay.next_open().await.expect("open attempt");
        assert_eq!(attempt.endpoint().as_str(), "ws://relay.test/");
        attempt.refuse("relay full");

        match open.await.unwrap() {
            Err(Error::Connection { message }) => assert_eq!(message, "relay full"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (transport, mut relay) = MemoryTransport::pair();

        let open = tokio::spawn(async move { transport.open(&endpoint()).await });
        let peer = relay.accept().await.expect("open attempt");
        let mut session = open.await.unwrap().expect("session");

        peer.close();
        assert!(session.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_session_close_is_seen_by_peer() {
        let (transport, mut relay) = MemoryTransport::pair();

        let open = tokio::spawn(async move { transport.open(&endpoint()).await });
        let mut peer = relay.accept().await.expect("open attempt");
        let mut session = open.await.unwrap().expect("session");

        session.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(!peer.is_open());
    }

    #[tokio::test]
    async fn test_open_without_relay_fails() {
        let (transport, relay) = MemoryTransport::pair();
        drop(relay);

        assert!(matches!(
            transport.open(&endpoint()).await,
            Err(Error::Connection { .. })
        ));
    }
}
