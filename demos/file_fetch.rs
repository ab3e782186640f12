//! File download.
//!
//! Demonstrates:
//! - Waiting for a binary frame registered before the request is sent
//! - A text acknowledgement followed by the binary payload
//! - Dropping the binary wait when the relay refuses
//!
//! Usage:
//!   cargo run --example file_fetch -- <file-hash>
//!   cargo run --example file_fetch -- <file-hash> --out ./file.bin
//!   cargo run --example file_fetch -- <file-hash> --relay ws://host:port --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result, bail};
use common::Args;
use relay_link::{Connection, Direction, Frame, FrameClass, MatchResult};
use serde_json::{Value, json};

// ============================================================================
// Constants
// ============================================================================

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

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
    println!("=== File Fetch ===\n");

    let file_id = args.target.context("usage: file_fetch <file-hash>")?;

    println!("[Connect] {}", args.relay);
    let connection = Connection::connect(&args.relay)?;
    connection.set_frame_observer(Box::new(|direction, frame| {
        if direction == Direction::Received && frame.class() == FrameClass::Binary {
            println!("          <- {} bytes", frame.binary_len());
        }
    }));
    connection.await_connected().await?;
    println!("          ✓ Connected\n");

    // ========================================================================
    // Fetch
    // ========================================================================

    println!("[Fetch] {file_id}");

    // The payload follows the acknowledgement immediately.
    let payload = connection.wait_for(FrameClass::Binary, |frame: &Frame| {
        MatchResult::from(frame.binary().map(<[u8]>::to_vec))
    });

    let key = file_id.clone();
    let status = connection
        .request(json!(["FETCH", file_id]), move |frame: &Frame| {
            match (frame.str_at(0), frame.str_at(1)) {
                (Some("FETCH"), Some(id)) if id == key => MatchResult::Matched((
                    frame.get(2).and_then(Value::as_bool).unwrap_or(false),
                    frame.str_at(3).unwrap_or_default().to_string(),
                )),
                _ => MatchResult::NoMatch,
            }
        })
        .timeout(FETCH_TIMEOUT)
        .await?;

    let (ok, detail) = status;
    if !ok {
        payload.cancel();
        bail!("relay refused: {detail}");
    }

    let bytes = payload.timeout(FETCH_TIMEOUT).await?;
    println!("        ✓ {} bytes, {detail}", bytes.len());

    if let Some(out) = args.out {
        tokio::fs::write(&out, &bytes)
            .await
            .with_context(|| format!("writing {out}"))?;
        println!("        ✓ Saved to {out}");
    }

    connection.shutdown();
    Ok(())
}
