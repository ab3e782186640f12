//! Pending matchers and the futures their callers await.
//!
//! A pending matcher pairs a caller's matcher closure with the sending half
//! of a oneshot channel. The registry only sees it through the type-erased
//! [`Listener`] trait; the caller keeps the receiving half wrapped in a
//! [`PendingResponse`].
//!
//! `Listener::offer` and `Listener::fail` take `Box<Self>`, so a listener
//! that settles is consumed and can never be evaluated again.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameClass};
use crate::identifiers::ListenerId;

use super::MatchResult;

// ============================================================================
// Types
// ============================================================================

/// Callback removing a listener from wherever it is registered.
pub(crate) type Canceller = Arc<dyn Fn(ListenerId) + Send + Sync>;

/// Result of offering a frame to a listener.
pub(crate) enum Offer {
    /// Not claimed; the listener goes back into the queue.
    Declined(Box<dyn Listener>),
    /// Claimed and resolved successfully.
    Matched,
    /// Claimed and resolved with an error.
    Failed,
}

// ============================================================================
// Listener
// ============================================================================

/// Type-erased pending matcher as stored by the registry.
pub(crate) trait Listener: Send {
    /// Returns the listener's ID.
    fn id(&self) -> ListenerId;

    /// Returns the frame class the listener waits for.
    fn class(&self) -> FrameClass;

    /// Returns `true` once nobody awaits the outcome anymore.
    fn is_abandoned(&self) -> bool;

    /// Evaluates the matcher against `frame`.
    fn offer(self: Box<Self>, frame: &Frame) -> Offer;

    /// Settles the outcome with `error` without evaluating the matcher.
    fn fail(self: Box<Self>, error: Error);
}

// ============================================================================
// PendingMatcher
// ============================================================================

/// A matcher closure waiting for a frame of one class.
struct PendingMatcher<T, F> {
    id: ListenerId,
    class: FrameClass,
    matcher: F,
    outcome: oneshot::Sender<Result<T>>,
}

/// Creates a listener and the response future settled by it.
pub(crate) fn pending_matcher<T, F>(
    class: FrameClass,
    matcher: F,
) -> (Box<dyn Listener>, PendingResponse<T>)
where
    T: Send + 'static,
    F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
{
    let id = ListenerId::next();
    let (outcome, receiver) = oneshot::channel();
    let listener = Box::new(PendingMatcher {
        id,
        class,
        matcher,
        outcome,
    });
    (listener, PendingResponse::new(id, receiver))
}

impl<T, F> Listener for PendingMatcher<T, F>
where
    T: Send + 'static,
    F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
{
    fn id(&self) -> ListenerId {
        self.id
    }

    fn class(&self) -> FrameClass {
        self.class
    }

    fn is_abandoned(&self) -> bool {
        self.outcome.is_closed()
    }

    fn offer(mut self: Box<Self>, frame: &Frame) -> Offer {
        let evaluated = catch_unwind(AssertUnwindSafe(|| (self.matcher)(frame)));

        let result = match evaluated {
            Ok(MatchResult::NoMatch) => return Offer::Declined(self),
            Ok(MatchResult::Matched(value)) => Ok(value),
            Ok(MatchResult::Failed(error)) => Err(error),
            Err(payload) => Err(Error::matcher_panicked(self.id, panic_message(&*payload))),
        };

        let offer = if result.is_ok() {
            Offer::Matched
        } else {
            Offer::Failed
        };

        let PendingMatcher { id, outcome, .. } = *self;
        if outcome.send(result).is_err() {
            debug!(%id, "Listener settled after its response was dropped");
        }

        offer
    }

    fn fail(self: Box<Self>, error: Error) {
        let _ = self.outcome.send(Err(error));
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Future resolving to the value a matcher claimed.
///
/// Resolves with:
///
/// - `Ok(value)` when the matcher returned [`MatchResult::Matched`]
/// - `Err(error)` when it returned [`MatchResult::Failed`] or panicked,
///   when the paired send failed, or [`Error::ConnectionClosed`] when the
///   connection shut down first
///
/// There is no built-in deadline; use [`PendingResponse::timeout`].
/// Dropping the future abandons the listener, which is discarded instead of
/// evaluated on the next frame of its class.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse<T> {
    /// Listener this response belongs to.
    id: ListenerId,
    /// Receiving half of the outcome channel.
    outcome: oneshot::Receiver<Result<T>>,
    /// Removes the listener from its registry.
    canceller: Option<Canceller>,
}

impl<T> Unpin for PendingResponse<T> {}

impl<T> std::fmt::Debug for PendingResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T> PendingResponse<T> {
    /// Wraps the receiving half of an outcome channel.
    pub(crate) fn new(id: ListenerId, outcome: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            id,
            outcome,
            canceller: None,
        }
    }

    /// Creates a response that is already settled with `error`.
    pub(crate) fn failed(error: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self::new(ListenerId::next(), rx)
    }

    /// Attaches the callback used by [`cancel`](Self::cancel).
    pub(crate) fn with_canceller(mut self, canceller: Canceller) -> Self {
        self.canceller = Some(canceller);
        self
    }

    /// Returns the ID of the listener behind this response.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener without waiting for a match.
    pub fn cancel(self) {
        if let Some(canceller) = &self.canceller {
            canceller(self.id);
        }
    }

    /// Waits for the response, giving up after `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestTimeout`] if no frame was claimed in time;
    /// the listener is removed in that case. Otherwise returns the
    /// outcome of the matcher.
    pub async fn timeout(self, duration: Duration) -> Result<T> {
        let id = self.id;
        let canceller = self.canceller.clone();

        match tokio::time::timeout(duration, self).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(canceller) = canceller {
                    canceller(id);
                }
                Err(Error::request_timeout(
                    id,
                    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }
}

impl<T> Future for PendingResponse<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ConnectionClosed)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn pong_matcher(frame: &Frame) -> MatchResult<i64> {
        match (frame.str_at(0), frame.get(2).and_then(|v| v.as_i64())) {
            (Some("PONG"), Some(n)) => MatchResult::Matched(n),
            _ => MatchResult::NoMatch,
        }
    }

    #[test]
    fn test_declined_listener_is_returned() {
        let (listener, response) = pending_matcher(FrameClass::Text, pong_matcher);
        let id = listener.id();

        let mut response = task::spawn(response);
        match listener.offer(&Frame::Text(json!(["NOTICE", "hi"]))) {
            Offer::Declined(back) => assert_eq!(back.id(), id),
            _ => panic!("expected decline"),
        }
        assert_pending!(response.poll());
    }

    #[test]
    fn test_matched_listener_resolves_response() {
        let (listener, response) = pending_matcher(FrameClass::Text, pong_matcher);
        let mut response = task::spawn(response);

        let offer = listener.offer(&Frame::Text(json!(["PONG", "abc", 42])));
        assert!(matches!(offer, Offer::Matched));
        assert_eq!(assert_ready!(response.poll()).unwrap(), 42);
    }

    #[test]
    fn test_panicking_matcher_fails_response() {
        let (listener, response) =
            pending_matcher::<(), _>(FrameClass::Text, |_: &Frame| panic!("matcher exploded"));
        let id = listener.id();

        let offer = listener.offer(&Frame::Text(json!([])));
        assert!(matches!(offer, Offer::Failed));

        match tokio_test::block_on(response) {
            Err(Error::MatcherPanicked {
                listener_id,
                message,
            }) => {
                assert_eq!(listener_id, id);
                assert_eq!(message, "matcher exploded");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_dropped_response_marks_listener_abandoned() {
        let (listener, response) = pending_matcher(FrameClass::Text, pong_matcher);
        assert!(!listener.is_abandoned());
        drop(response);
        assert!(listener.is_abandoned());
    }

    #[test]
    fn test_dropped_listener_closes_response() {
        let (listener, response) = pending_matcher(FrameClass::Binary, |_: &Frame| {
            MatchResult::Matched(())
        });
        drop(listener);
        assert!(matches!(
            tokio_test::block_on(response),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_cancel_invokes_canceller() {
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cancelled);
        let (_listener, response) = pending_matcher(FrameClass::Text, pong_matcher);
        let id = response.id();

        response
            .with_canceller(Arc::new(move |id| sink.lock().push(id)))
            .cancel();

        assert_eq!(*cancelled.lock(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_listener() {
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cancelled);
        let (_listener, response) = pending_matcher(FrameClass::Text, pong_matcher);
        let id = response.id();

        let result = response
            .with_canceller(Arc::new(move |id| sink.lock().push(id)))
            .timeout(Duration::from_millis(250))
            .await;

        assert!(matches!(
            result,
            Err(Error::RequestTimeout { timeout_ms: 250, .. })
        ));
        assert_eq!(*cancelled.lock(), vec![id]);
    }

    #[test]
    fn test_failed_response() {
        let response = PendingResponse::<()>::failed(Error::NotConnected);
        assert!(matches!(
            tokio_test::block_on(response),
            Err(Error::NotConnected)
        ));
    }
}
