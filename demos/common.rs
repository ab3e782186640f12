//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Relay used when `--relay` is not given.
pub const DEFAULT_RELAY: &str = "ws://127.0.0.1:7000";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub relay: String,
    /// First argument that is not a flag.
    pub target: Option<String>,
    pub out: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    ///
    /// Accepts `--debug`, `--relay <url>`, `--out <path>` and one positional
    /// argument.
    pub fn parse() -> Self {
        let mut args = Self {
            debug: false,
            relay: DEFAULT_RELAY.to_string(),
            target: None,
            out: None,
        };

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--debug" => args.debug = true,
                "--relay" => {
                    if let Some(relay) = iter.next() {
                        args.relay = relay;
                    }
                }
                "--out" => args.out = iter.next(),
                _ if args.target.is_none() => args.target = Some(arg),
                _ => {}
            }
        }

        args
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "relay_link=debug"
    } else {
        "relay_link=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
