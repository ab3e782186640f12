//! Matcher-based request/response correlation.
//!
//! Instead of a message-type registry, callers describe the frame they wait
//! for with a closure returning a [`MatchResult`]. Pending matchers live in a
//! [`MatcherRegistry`], and every inbound frame is offered to all of them in
//! one dispatch pass.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `result` | [`MatchResult`] returned by matchers |
//! | `listener` | Type-erased pending matcher and [`PendingResponse`] |
//! | `registry` | [`MatcherRegistry`] and the dispatch pass |

// ============================================================================
// Submodules
// ============================================================================

/// Pending matchers and response futures.
pub mod listener;

/// Ordered registry and dispatch.
pub mod registry;

/// Matcher outcome type.
pub mod result;

// ============================================================================
// Re-exports
// ============================================================================

pub use listener::PendingResponse;
pub use registry::{DispatchSummary, MatcherRegistry};
pub use result::MatchResult;
