//! WebSocket client transport.
//!
//! Opens sessions with `tokio_tungstenite::connect_async`. Text frames map
//! to `Message::Text`, binary frames to `Message::Binary`. Ping, pong and
//! raw frames are handled by tungstenite and skipped here.
//!
//! `wss://` endpoints require the `tls` cargo feature.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{Session, Transport, WireFrame};

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Default transport: a WebSocket client.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn Session>> {
        let (stream, response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(status = %response.status(), %endpoint, "WebSocket handshake completed");

        Ok(Box::new(WebSocketSession { stream }))
    }
}

// ============================================================================
// WebSocketSession
// ============================================================================

/// Session over one WebSocket stream.
struct WebSocketSession {
    stream: ClientStream,
}

#[async_trait]
impl Session for WebSocketSession {
    async fn send(&mut self, frame: WireFrame) -> Result<()> {
        let message = match frame {
            WireFrame::Text(text) => Message::Text(text.into()),
            WireFrame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WireFrame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WireFrame::Text(text.to_string()))),
                Ok(Message::Binary(bytes)) => return Some(Ok(WireFrame::Binary(bytes.to_vec()))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }
                // Ping, Pong, Frame
                Ok(other) => trace!(kind = ?other, "Skipping control frame"),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accepts one connection and echoes text and binary frames.
    async fn spawn_echo_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("bound address");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(Ok(message)) = ws.next().await {
                if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
                    break;
                }
            }
        });

        Url::parse(&format!("ws://{addr}")).expect("valid url")
    }

    #[tokio::test]
    async fn test_echo_text_and_binary() {
        let url = spawn_echo_server().await;
        let mut session = WebSocketTransport::new()
            .open(&url)
            .await
            .expect("open should succeed");

        session
            .send(WireFrame::Text(r#"["PING","abc"]"#.into()))
            .await
            .unwrap();
        assert_eq!(
            session.recv().await.unwrap().unwrap(),
            WireFrame::Text(r#"["PING","abc"]"#.into())
        );

        session.send(WireFrame::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(
            session.recv().await.unwrap().unwrap(),
            WireFrame::Binary(vec![1, 2, 3])
        );

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let result = WebSocketTransport::new().open(&url).await;

        assert!(matches!(result, Err(Error::Connection { .. })));
    }
}
