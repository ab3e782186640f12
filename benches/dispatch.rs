//! Dispatch benchmark suite.
//!
//! Measures matcher dispatch at different registry sizes:
//! - Pending matchers: 10, 100, 1000
//! - Round trips through an in-memory relay
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use relay_link::{Connection, Frame, FrameClass, MatchResult, MatcherRegistry, MemoryTransport};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PENDING_COUNTS: &[usize] = &[10, 100, 1000];

// ============================================================================
// Helpers
// ============================================================================

fn keyed(key: String) -> impl FnMut(&Frame) -> MatchResult<Value> {
    move |frame: &Frame| match (frame.str_at(0), frame.str_at(1)) {
        (Some("EVENT"), Some(id)) if id == key => MatchResult::Matched(Value::Null),
        _ => MatchResult::NoMatch,
    }
}

// ============================================================================
// Benchmark: Registry Dispatch
// ============================================================================

fn bench_dispatch_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_miss");

    for &count in PENDING_COUNTS {
        let mut registry = MatcherRegistry::new();
        let responses: Vec<_> = (0..count)
            .map(|i| registry.register(FrameClass::Text, keyed(format!("sub{i}"))))
            .collect();
        let frame = Frame::from(json!(["EVENT", "nobody", {"kind": 1}]));

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("pending", count), &count, |b, _| {
            b.iter(|| registry.dispatch(&frame));
        });

        drop(responses);
    }

    group.finish();
}

fn bench_dispatch_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_hit");

    for &count in PENDING_COUNTS {
        group.bench_with_input(BenchmarkId::new("pending", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mut registry = MatcherRegistry::new();
                    let responses: Vec<_> = (0..count)
                        .map(|i| registry.register(FrameClass::Text, keyed(format!("sub{i}"))))
                        .collect();
                    (registry, responses)
                },
                |(mut registry, responses)| {
                    let frame = Frame::from(json!(["EVENT", format!("sub{}", count - 1)]));
                    let summary = registry.dispatch(&frame);
                    (summary, responses)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let (connection, mut peer) = rt.block_on(async {
        let (transport, mut relay) = MemoryTransport::pair();
        let connection = Connection::builder()
            .url("ws://relay.bench")
            .transport(Arc::new(transport))
            .connect()
            .expect("valid configuration");
        let peer = relay.accept().await.expect("open attempt");
        connection.await_connected().await.expect("session open");
        (connection, peer)
    });

    // Echo PING as PONG from a relay task.
    rt.spawn(async move {
        while let Some(frame) = peer.recv().await {
            if let Some(key) = frame.str_at(1) {
                let _ = peer.send(json!(["PONG", key, 1]));
            }
        }
    });

    let mut group = c.benchmark_group("round_trip");
    group.bench_function("ping_pong", |b| {
        b.to_async(&rt).iter(|| async {
            connection
                .request(json!(["PING", "bench"]), |frame: &Frame| {
                    match (frame.str_at(0), frame.str_at(1)) {
                        (Some("PONG"), Some("bench")) => MatchResult::Matched(()),
                        _ => MatchResult::NoMatch,
                    }
                })
                .await
                .expect("pong")
        });
    });
    group.finish();

    connection.shutdown();
}

criterion_group!(benches, bench_dispatch_miss, bench_dispatch_hit, bench_round_trip);
criterion_main!(benches);
