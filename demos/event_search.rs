//! Event lookup by id.
//!
//! Demonstrates:
//! - A subscription whose matcher settles on the first `EVENT` or on `EOSE`
//! - Decoding the matched payload into a `SignedEvent`
//! - Closing the subscription with a fire-and-forget send
//!
//! Usage:
//!   cargo run --example event_search -- <event-id>
//!   cargo run --example event_search -- <event-id> --relay ws://host:port
//!   cargo run --example event_search -- <event-id> --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use common::Args;
use relay_link::{Connection, Error, Frame, MatchResult, SignedEvent};
use serde_json::json;

// ============================================================================
// Constants
// ============================================================================

const SUBSCRIPTION: &str = "demo_srch";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Event Search ===\n");

    let event_id = args.target.context("usage: event_search <event-id>")?;

    println!("[Connect] {}", args.relay);
    let connection = Connection::connect(&args.relay)?;
    connection.await_connected().await?;
    println!("          ✓ Connected\n");

    // ========================================================================
    // Subscribe
    // ========================================================================

    println!("[Search] {event_id}");

    let found = connection
        .request(
            json!(["REQ", SUBSCRIPTION, {"ids": [event_id]}]),
            match_first_event,
        )
        .timeout(SEARCH_TIMEOUT)
        .await;

    // Close regardless of the outcome.
    connection.send(json!(["CLOSE", SUBSCRIPTION])).await?;

    match found? {
        Some(event) => {
            println!("         ✓ Found");
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        None => println!("         not found"),
    }

    connection.shutdown();
    Ok(())
}

/// Settles on the first event of the subscription, or `None` at `EOSE`.
fn match_first_event(frame: &Frame) -> MatchResult<Option<SignedEvent>> {
    match (frame.str_at(0), frame.str_at(1)) {
        (Some("EVENT"), Some(SUBSCRIPTION)) => match frame.get(2) {
            Some(payload) => match serde_json::from_value(payload.clone()) {
                Ok(event) => MatchResult::Matched(Some(event)),
                Err(e) => MatchResult::Failed(Error::protocol(format!("malformed event: {e}"))),
            },
            None => MatchResult::Failed(Error::protocol("EVENT without payload")),
        },
        (Some("EOSE"), _) => MatchResult::Matched(None),
        _ => MatchResult::NoMatch,
    }
}
