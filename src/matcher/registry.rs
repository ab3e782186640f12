//! Ordered registry of pending matchers and the dispatch pass.
//!
//! # Dispatch
//!
//! For an inbound frame of class `C`:
//!
//! 1. Matchers of another class are kept, untouched.
//! 2. Matchers of class `C` are offered the frame in registration order.
//!    `NoMatch` keeps the matcher, anything else settles and removes it.
//! 3. Kept matchers retain their relative order.
//!
//! Every candidate sees every frame: the pass does not stop at the first
//! match, so two matchers accepting the same frame both settle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, trace};

use crate::error::Error;
use crate::frame::{Frame, FrameClass};
use crate::identifiers::ListenerId;

use super::listener::{Listener, Offer, pending_matcher};
use super::{MatchResult, PendingResponse};

// ============================================================================
// DispatchSummary
// ============================================================================

/// Counters describing one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Matchers of the frame's class that were considered.
    pub candidates: usize,
    /// Matchers settled successfully.
    pub matched: usize,
    /// Matchers settled with an error.
    pub failed: usize,
    /// Matchers discarded because their response was dropped.
    pub abandoned: usize,
    /// Matchers still pending after the pass.
    pub remaining: usize,
}

impl DispatchSummary {
    /// Returns `true` if at least one matcher claimed the frame.
    #[inline]
    #[must_use]
    pub fn claimed(&self) -> bool {
        self.matched + self.failed > 0
    }
}

// ============================================================================
// MatcherRegistry
// ============================================================================

/// Pending matchers in registration order.
///
/// Owned by a single task; the connection event loop is the only mutator.
#[derive(Default)]
pub struct MatcherRegistry {
    pending: Vec<Box<dyn Listener>>,
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl MatcherRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a matcher for frames of `class`.
    ///
    /// The returned response settles when the matcher claims a frame.
    pub fn register<T, F>(&mut self, class: FrameClass, matcher: F) -> PendingResponse<T>
    where
        T: Send + 'static,
        F: FnMut(&Frame) -> MatchResult<T> + Send + 'static,
    {
        let (listener, response) = pending_matcher(class, matcher);
        self.insert(listener);
        response
    }

    /// Appends an already built listener.
    pub(crate) fn insert(&mut self, listener: Box<dyn Listener>) {
        trace!(id = %listener.id(), class = %listener.class(), "Matcher registered");
        self.pending.push(listener);
    }

    /// Offers `frame` to every pending matcher of its class.
    pub fn dispatch(&mut self, frame: &Frame) -> DispatchSummary {
        let class = frame.class();
        let mut summary = DispatchSummary::default();
        let queued = std::mem::take(&mut self.pending);
        self.pending.reserve(queued.len());

        for listener in queued {
            if listener.class() != class {
                self.pending.push(listener);
                continue;
            }

            summary.candidates += 1;

            if listener.is_abandoned() {
                debug!(id = %listener.id(), "Discarding abandoned matcher");
                summary.abandoned += 1;
                continue;
            }

            match listener.offer(frame) {
                Offer::Declined(listener) => self.pending.push(listener),
                Offer::Matched => summary.matched += 1,
                Offer::Failed => summary.failed += 1,
            }
        }

        summary.remaining = self.pending.len();
        trace!(
            %class,
            candidates = summary.candidates,
            matched = summary.matched,
            failed = summary.failed,
            remaining = summary.remaining,
            "Dispatch pass complete"
        );

        summary
    }

    /// Removes the matcher `id`, settling it with [`Error::Cancelled`].
    ///
    /// Returns `false` if it already settled.
    pub fn cancel(&mut self, id: ListenerId) -> bool {
        self.fail(id, Error::cancelled(id))
    }

    /// Removes the matcher `id`, settling it with `error`.
    ///
    /// Returns `false` if it already settled.
    pub fn fail(&mut self, id: ListenerId, error: Error) -> bool {
        match self.pending.iter().position(|l| l.id() == id) {
            Some(index) => {
                self.pending.remove(index).fail(error);
                true
            }
            None => false,
        }
    }

    /// Settles every pending matcher with an error from `make_error`.
    ///
    /// Returns the number of matchers settled.
    pub fn fail_all(&mut self, make_error: impl Fn() -> Error) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();

        for listener in pending {
            listener.fail(make_error());
        }

        count
    }

    /// Returns the number of pending matchers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the IDs of pending matchers in registration order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<ListenerId> {
        self.pending.iter().map(|l| l.id()).collect()
    }

    /// Returns the number of pending matchers of `class`.
    #[must_use]
    pub fn count_class(&self, class: FrameClass) -> usize {
        self.pending.iter().filter(|l| l.class() == class).count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde_json::{Value, json};
    use tokio_test::{assert_pending, assert_ready, task};

    /// Matches `[kind, key, value]` and yields `value`.
    fn keyed(kind: &'static str, key: &'static str) -> impl FnMut(&Frame) -> MatchResult<Value> {
        move |frame: &Frame| match (frame.str_at(0), frame.str_at(1)) {
            (Some(k), Some(id)) if k == kind && id == key => {
                MatchResult::Matched(frame.get(2).cloned().unwrap_or(Value::Null))
            }
            _ => MatchResult::NoMatch,
        }
    }

    #[test]
    fn test_ping_pong_resolves_value() {
        let mut registry = MatcherRegistry::new();
        let response = registry.register(FrameClass::Text, keyed("PONG", "abc"));

        let summary = registry.dispatch(&Frame::Text(json!(["PONG", "abc", 42])));

        assert_eq!(summary.matched, 1);
        assert!(registry.is_empty());
        assert_eq!(tokio_test::block_on(response).unwrap(), json!(42));
    }

    #[test]
    fn test_broadcast_settles_only_matching_key() {
        let mut registry = MatcherRegistry::new();
        let abc = registry.register(FrameClass::Text, keyed("EVENT", "abc"));
        let mut xyz = task::spawn(registry.register(FrameClass::Text, keyed("EVENT", "xyz")));

        let summary = registry.dispatch(&Frame::Text(json!(["EVENT", "abc"])));

        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.remaining, 1);
        assert_eq!(tokio_test::block_on(abc).unwrap(), Value::Null);
        assert_pending!(xyz.poll());
    }

    #[test]
    fn test_false_settles_instead_of_waiting() {
        let mut registry = MatcherRegistry::new();
        let response = registry.register(FrameClass::Text, |frame: &Frame| {
            if frame.str_at(0) == Some("EOSE") {
                MatchResult::Matched(false)
            } else {
                MatchResult::NoMatch
            }
        });

        registry.dispatch(&Frame::Text(json!(["EOSE", "demo_srch"])));

        assert!(registry.is_empty());
        assert!(!tokio_test::block_on(response).unwrap());
    }

    #[test]
    fn test_every_candidate_sees_the_frame() {
        let mut registry = MatcherRegistry::new();
        let first = registry.register(FrameClass::Text, keyed("OK", "id"));
        let second = registry.register(FrameClass::Text, keyed("OK", "id"));

        let summary = registry.dispatch(&Frame::Text(json!(["OK", "id", true])));

        assert_eq!(summary.matched, 2);
        assert_eq!(tokio_test::block_on(first).unwrap(), json!(true));
        assert_eq!(tokio_test::block_on(second).unwrap(), json!(true));
    }

    #[test]
    fn test_failure_is_isolated() {
        let mut registry = MatcherRegistry::new();
        let failing = registry.register::<(), _>(FrameClass::Text, |_: &Frame| {
            MatchResult::Failed(Error::matcher("rejected"))
        });
        let panicking =
            registry.register::<(), _>(FrameClass::Text, |_: &Frame| panic!("bad matcher"));
        let healthy = registry.register(FrameClass::Text, keyed("OK", "id"));

        let summary = registry.dispatch(&Frame::Text(json!(["OK", "id", 1])));

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.matched, 1);
        assert!(matches!(
            tokio_test::block_on(failing),
            Err(Error::Matcher { .. })
        ));
        assert!(matches!(
            tokio_test::block_on(panicking),
            Err(Error::MatcherPanicked { .. })
        ));
        assert_eq!(tokio_test::block_on(healthy).unwrap(), json!(1));
    }

    #[test]
    fn test_classes_are_dispatched_separately() {
        let mut registry = MatcherRegistry::new();
        let mut text = task::spawn(
            registry.register(FrameClass::Text, |_: &Frame| MatchResult::Matched("text")),
        );
        let binary = registry.register(FrameClass::Binary, |frame: &Frame| {
            MatchResult::Matched(frame.binary_len())
        });

        let summary = registry.dispatch(&Frame::Binary(vec![0; 8]));

        assert_eq!(summary.candidates, 1);
        assert_eq!(registry.count_class(FrameClass::Text), 1);
        assert_eq!(registry.count_class(FrameClass::Binary), 0);
        assert_eq!(tokio_test::block_on(binary).unwrap(), 8);
        assert_pending!(text.poll());

        registry.dispatch(&Frame::Text(json!([])));
        assert_eq!(assert_ready!(text.poll()).unwrap(), "text");
    }

    #[test]
    fn test_settled_matcher_is_never_evaluated_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = MatcherRegistry::new();
        let _response = registry.register(FrameClass::Text, move |_: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
            MatchResult::Matched(())
        });

        registry.dispatch(&Frame::Text(json!([])));
        registry.dispatch(&Frame::Text(json!([])));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abandoned_matcher_is_discarded_unevaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = MatcherRegistry::new();
        let response = registry.register(FrameClass::Text, move |_: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
            MatchResult::<()>::NoMatch
        });
        drop(response);

        let summary = registry.dispatch(&Frame::Text(json!([])));

        assert_eq!(summary.abandoned, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_removes_matcher() {
        let mut registry = MatcherRegistry::new();
        let response = registry.register(FrameClass::Text, keyed("OK", "a"));
        let id = response.id();

        assert!(registry.cancel(id));
        assert!(!registry.cancel(id));
        assert!(matches!(
            tokio_test::block_on(response),
            Err(Error::Cancelled { listener_id }) if listener_id == id
        ));
    }

    #[test]
    fn test_fail_all() {
        let mut registry = MatcherRegistry::new();
        let a = registry.register(FrameClass::Text, keyed("OK", "a"));
        let b = registry.register(FrameClass::Binary, |_: &Frame| MatchResult::Matched(()));

        assert_eq!(registry.fail_all(|| Error::ConnectionClosed), 2);
        assert!(registry.is_empty());
        assert!(matches!(tokio_test::block_on(a), Err(Error::ConnectionClosed)));
        assert!(matches!(tokio_test::block_on(b), Err(Error::ConnectionClosed)));
    }

    proptest! {
        #[test]
        fn prop_unmatched_keep_registration_order(
            keys in proptest::collection::vec(0u8..6, 1..24),
            hit in 0u8..6,
        ) {
            let mut registry = MatcherRegistry::new();
            let mut responses = Vec::new();

            for key in &keys {
                let key = *key;
                responses.push((key, registry.register(FrameClass::Text, move |frame: &Frame| {
                    match frame.get(1).and_then(Value::as_u64) {
                        Some(k) if k == u64::from(key) => MatchResult::Matched(key),
                        _ => MatchResult::NoMatch,
                    }
                })));
            }

            let expected: Vec<ListenerId> = responses
                .iter()
                .filter(|(key, _)| *key != hit)
                .map(|(_, response)| response.id())
                .collect();

            let summary = registry.dispatch(&Frame::Text(json!(["EVENT", hit])));

            prop_assert_eq!(summary.matched, keys.len() - expected.len());
            prop_assert_eq!(registry.pending_ids(), expected);
        }
    }
}
