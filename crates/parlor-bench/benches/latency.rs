//! Latency benchmarks for Parlor.
//!
//! These benchmarks focus on single-operation latency through the hub.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parlor_bench::Room;
use parlor_core::ConnectionId;
use std::time::Instant;
use tokio::runtime::Runtime;

/// Benchmark a full connect/join/disconnect cycle in a busy room.
fn bench_join_leave(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("join_leave");

    group.bench_function("new_user_100_online", |b| {
        let mut room = rt.block_on(Room::with_users(100));

        b.iter_custom(|iters| {
            let start = Instant::now();
            for i in 0..iters {
                let id = ConnectionId::new(format!("bench-{i}"));
                rt.block_on(async {
                    room.hub.connect(&id, Some("visitor")).await.unwrap();
                    room.hub.disconnect(&id).await;
                });
                room.drain();
            }
            start.elapsed()
        });
    });

    group.bench_function("second_session_100_online", |b| {
        let mut room = rt.block_on(Room::with_users(100));

        b.iter_custom(|iters| {
            let start = Instant::now();
            for i in 0..iters {
                let id = ConnectionId::new(format!("tab-{i}"));
                rt.block_on(async {
                    room.hub.connect(&id, Some("user-0")).await.unwrap();
                    room.hub.disconnect(&id).await;
                });
                room.drain();
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark the read paths clients poll over HTTP.
fn bench_snapshots(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("snapshots");

    let mut room = rt.block_on(Room::with_users(100));
    let sender = room.members[0].0.clone();
    rt.block_on(async {
        for i in 0..1000 {
            room.hub
                .send_message(&sender, &format!("message {i}"))
                .await
                .unwrap();
        }
    });
    room.drain();

    group.bench_function("online_users_100", |b| {
        b.iter(|| rt.block_on(black_box(&room.hub).online_users()))
    });

    group.bench_function("history_1000", |b| {
        b.iter(|| rt.block_on(black_box(&room.hub).history()))
    });

    group.finish();
}

criterion_group!(benches, bench_join_leave, bench_snapshots);
criterion_main!(benches);
