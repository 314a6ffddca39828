//! Latency benchmarks for GeoChat.
//!
//! These benchmarks measure the time from a router call until the frame sits
//! in the recipient's outbound queue.

use criterion::{criterion_group, criterion_main, Criterion};
use geochat_core::{outbound_queue, BroadcastRouter, ConnectionId, Coordinate};
use std::time::Instant;

/// Benchmark chat send + receive latency.
fn bench_chat_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("chat_latency");

    group.bench_function("single_peer", |b| {
        b.iter_custom(|iters| {
            let router = BroadcastRouter::new();
            let here = Coordinate::new(35.6762, 139.6503).unwrap();
            let (a, b_id) = (ConnectionId::new("a"), ConnectionId::new("b"));
            let (a_sink, _a_rx) = outbound_queue(16);
            let (b_sink, mut b_rx) = outbound_queue(16);
            router.register(a.clone(), a_sink).unwrap();
            router.register(b_id.clone(), b_sink).unwrap();
            router.on_location_update(&a, here).unwrap();
            router.on_location_update(&b_id, here).unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                router.on_chat_message(&a, "ping").unwrap();
                let _ = b_rx.try_recv();
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark a join and its presence notice.
fn bench_join_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_latency");

    group.bench_function("join_and_notify", |b| {
        b.iter_custom(|iters| {
            let router = BroadcastRouter::new();
            let here = Coordinate::new(35.6762, 139.6503).unwrap();
            let elsewhere = Coordinate::new(-33.8688, 151.2093).unwrap();
            let host = ConnectionId::new("host");
            let guest = ConnectionId::new("guest");
            let (host_sink, mut host_rx) = outbound_queue(16);
            let (guest_sink, _guest_rx) = outbound_queue(16);
            router.register(host.clone(), host_sink).unwrap();
            router.register(guest.clone(), guest_sink).unwrap();
            router.on_location_update(&host, here).unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                router.on_location_update(&guest, here).unwrap();
                let _ = host_rx.try_recv();
                router.on_location_update(&guest, elsewhere).unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_chat_latency,
    bench_join_latency,
);
criterion_main!(benches);
