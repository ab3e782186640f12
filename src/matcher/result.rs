//! Outcome of offering a frame to a matcher.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// MatchResult
// ============================================================================

/// What a matcher decided about one frame.
///
/// `NoMatch` is the only outcome that keeps the matcher queued. Any value
/// in `Matched`, including `false`, `0` or `Value::Null`, settles the
/// waiting caller.
///
/// # Example
///
/// ```
/// use relay_link::{Frame, MatchResult};
/// use serde_json::json;
///
/// let mut matcher = |frame: &Frame| match (frame.str_at(0), frame.str_at(1)) {
///     (Some("PONG"), Some("abc")) => MatchResult::Matched(frame.get(2).cloned()),
///     _ => MatchResult::NoMatch,
/// };
///
/// let reply = Frame::Text(json!(["PONG", "abc", 42]));
/// assert!(matcher(&reply).is_matched());
/// ```
#[derive(Debug)]
pub enum MatchResult<T> {
    /// Not the frame this matcher waits for; keep waiting.
    NoMatch,
    /// Claim the frame and resolve the caller with this value.
    Matched(T),
    /// Claim the frame and fail the caller with this error.
    Failed(Error),
}

impl<T> MatchResult<T> {
    /// Returns `true` for [`MatchResult::NoMatch`].
    #[inline]
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }

    /// Returns `true` for [`MatchResult::Matched`].
    #[inline]
    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Returns `true` for [`MatchResult::Failed`].
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Maps the matched value.
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MatchResult<U> {
        match self {
            Self::NoMatch => MatchResult::NoMatch,
            Self::Matched(value) => MatchResult::Matched(f(value)),
            Self::Failed(error) => MatchResult::Failed(error),
        }
    }

    /// Converts a claimed frame into the caller's result.
    ///
    /// Returns `None` for [`MatchResult::NoMatch`].
    #[inline]
    pub fn into_result(self) -> Option<Result<T>> {
        match self {
            Self::NoMatch => None,
            Self::Matched(value) => Some(Ok(value)),
            Self::Failed(error) => Some(Err(error)),
        }
    }
}

impl<T> From<Option<T>> for MatchResult<T> {
    /// `None` means no match, `Some(v)` matches with `v`.
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NoMatch, Self::Matched)
    }
}

impl<T> From<Result<T>> for MatchResult<T> {
    /// `Ok(v)` matches with `v`, `Err(e)` fails with `e`.
    fn from(value: Result<T>) -> Self {
        match value {
            Ok(value) => Self::Matched(value),
            Err(error) => Self::Failed(error),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
