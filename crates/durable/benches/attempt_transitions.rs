//! Attempt transition benchmark
//!
//! Benchmarks the engine's hot path: load → transition → versioned save →
//! commit effects, against the in-memory store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use uuid::Uuid;

use relay_durable::activity::{
    Collaborators, FailureDetail, RecordingDispatcher, RecordingTimers, ScheduleActivity,
};
use relay_durable::clock::ManualClock;
use relay_durable::config::EngineConfig;
use relay_durable::engine::ActivityEngine;
use relay_durable::persistence::InMemoryActivityStore;
use relay_durable::reliability::RetryPolicy;

struct Bench {
    engine: ActivityEngine,
    timers: Arc<RecordingTimers>,
    dispatcher: Arc<RecordingDispatcher>,
    clock: Arc<ManualClock>,
}

fn bench_engine(policy: RetryPolicy) -> Bench {
    let timers = Arc::new(RecordingTimers::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let clock = Arc::new(ManualClock::default());
    let engine = ActivityEngine::new(
        Arc::new(InMemoryActivityStore::new()),
        Collaborators::new(timers.clone(), dispatcher.clone()),
        EngineConfig::default().with_default_retry_policy(policy),
    )
    .with_clock(clock.clone());
    Bench {
        engine,
        timers,
        dispatcher,
        clock,
    }
}

/// Benchmark schedule → start → complete for independent activities
fn bench_lifecycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("attempt_transitions/lifecycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("schedule_start_complete", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let bench = bench_engine(RetryPolicy::default());
            let workflow_id = Uuid::now_v7();

            let start = Instant::now();
            for i in 0..iters {
                let snapshot = bench
                    .engine
                    .schedule(ScheduleActivity::new(
                        workflow_id,
                        format!("step-{}", i),
                        "bench",
                        serde_json::json!({}),
                    ))
                    .await
                    .unwrap();
                let task = bench.dispatcher.take().remove(0);
                bench.engine.start(&task).await.unwrap();
                bench
                    .engine
                    .complete(&snapshot.key, serde_json::json!({}))
                    .await
                    .unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark failing attempts through backoff timers
fn bench_retry_cycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("attempt_transitions/retry");

    for attempts in [2u32, 5, 10] {
        group.throughput(Throughput::Elements(attempts as u64));
        group.bench_with_input(
            BenchmarkId::new("attempts", attempts),
            &attempts,
            |b, &attempts| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let bench = bench_engine(RetryPolicy::fixed(Duration::from_secs(1), attempts));
                    let workflow_id = Uuid::now_v7();

                    let start = Instant::now();
                    for i in 0..iters {
                        let key = bench
                            .engine
                            .schedule(ScheduleActivity::new(
                                workflow_id,
                                format!("retry-{}", i),
                                "bench",
                                serde_json::json!({}),
                            ))
                            .await
                            .unwrap()
                            .key;

                        for _ in 0..attempts {
                            let task = bench.dispatcher.take().remove(0);
                            bench.engine.start(&task).await.unwrap();
                            let snapshot = bench
                                .engine
                                .fail(&key, FailureDetail::new("bench"))
                                .await
                                .unwrap();
                            if snapshot.status.is_terminal() {
                                break;
                            }
                            bench.clock.advance(Duration::from_secs(1));
                            let (token, _) = bench.timers.armed().pop().unwrap();
                            bench.timers.take();
                            bench.engine.attempt_due(&key, token).await.unwrap();
                        }
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmark operator control operations on one instance in backoff
fn bench_control_operations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("attempt_transitions/control");
    group.throughput(Throughput::Elements(3));

    group.bench_function("pause_reset_unpause", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let bench = bench_engine(RetryPolicy::fixed(Duration::from_secs(3600), 0));
            let key = bench
                .engine
                .schedule(ScheduleActivity::new(
                    Uuid::now_v7(),
                    "control",
                    "bench",
                    serde_json::json!({}),
                ))
                .await
                .unwrap()
                .key;

            let start = Instant::now();
            for _ in 0..iters {
                bench.engine.pause(&key).await.unwrap();
                bench.engine.reset(&key, true).await.unwrap();
                bench.engine.unpause(&key).await.unwrap();
            }
            let elapsed = start.elapsed();
            bench.dispatcher.take();
            elapsed
        });
    });

    group.finish();
}

/// Benchmark the retry policy decision alone
fn bench_policy_evaluate(c: &mut Criterion) {
    let policy = RetryPolicy::default().with_maximum_attempts(50);

    c.bench_function("attempt_transitions/policy_evaluate", |b| {
        b.iter(|| {
            for attempt in 2..=50u32 {
                black_box(policy.evaluate(
                    black_box(attempt),
                    Duration::from_secs(30),
                    Some(Duration::from_secs(3600)),
                ));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_lifecycle,
    bench_retry_cycle,
    bench_control_operations,
    bench_policy_evaluate
);
criterion_main!(benches);
