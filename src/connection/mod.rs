//! Auto-reconnecting relay connection.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Connection`] handle |
//! | `builder` | [`ConnectionBuilder`] |
//! | `options` | [`ConnectionOptions`] and defaults |
//! | `readiness` | [`ConnectionState`] and readiness tracking |
//! | `event_loop` | Task owning the session and matcher registry |

// ============================================================================
// Submodules
// ============================================================================

/// Connection builder.
pub mod builder;

/// Connection handle.
pub mod core;

/// Reconnecting event loop.
pub(crate) mod event_loop;

/// Connection options.
pub mod options;

/// Readiness tracking.
pub mod readiness;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use core::Connection;
pub use event_loop::FrameObserver;
pub use options::{ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY};
pub use readiness::ConnectionState;
