//! Dispatch and effect interpretation benchmarks
//!
//! Measures the cost of the hot paths:
//! - Reducer execution in isolation
//! - `Store::send` with and without effects
//! - Registry churn from cancellable and debounced effects
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use uniflow_core::prelude::*;
use uniflow_runtime::{CancellationRegistry, Store, StoreConfig};

#[derive(Clone, Debug)]
struct BenchState {
    counter: i64,
    data: Vec<u8>, // For measuring snapshot cost
}

impl Default for BenchState {
    fn default() -> Self {
        Self {
            counter: 0,
            data: vec![0; 1024],
        }
    }
}

#[derive(Clone, Debug)]
enum BenchAction {
    Increment,
    SetValue(i64),
    Fanout(usize),
    RunOnce,
    Tagged,
    Debounced,
}

struct BenchReducer;

impl Reducer for BenchReducer {
    type State = BenchState;
    type ReducerState = ();
    type ViewAction = BenchAction;
    type ReducerAction = ();
    type Environment = ();

    fn reduce(
        &self,
        state: &mut StateContainer<BenchState>,
        action: Action<BenchAction, ()>,
        _env: &(),
    ) -> Effect<Action<BenchAction, ()>> {
        match action {
            Action::View(BenchAction::Increment) => {
                state.counter += 1;
                Effect::none()
            },
            Action::View(BenchAction::SetValue(value)) => {
                state.counter = value;
                state.data[0] = value.to_le_bytes()[0];
                Effect::none()
            },
            Action::View(BenchAction::Fanout(n)) => {
                Effect::concurrent_actions(vec![Action::View(BenchAction::Increment); n])
            },
            Action::View(BenchAction::RunOnce) => run_effect!(|send| {
                send.send_and_wait(Action::View(BenchAction::Increment)).await
            }),
            Action::View(BenchAction::Tagged) => {
                Effect::send(Action::View(BenchAction::Increment)).cancellable("bench", true)
            },
            Action::View(BenchAction::Debounced) => {
                Effect::send(Action::View(BenchAction::Increment))
                    .debounce("bench-debounce", Duration::ZERO)
            },
            Action::Internal(()) => Effect::none(),
        }
    }
}

fn store(recording: bool) -> Store<BenchReducer> {
    let config = StoreConfig::default()
        .with_registry(Arc::new(CancellationRegistry::new()))
        .with_transition_recording(recording);
    Store::with_config(BenchState::default(), BenchReducer, (), config)
}

/// Benchmark reducer execution in isolation (no Store overhead)
fn benchmark_reducer_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("reducer");
    group.throughput(Throughput::Elements(1));

    let reducer = BenchReducer;

    group.bench_function("increment", |b| {
        let mut state = StateContainer::from(BenchState::default());
        b.iter(|| {
            let _effect = reducer.reduce(
                &mut state,
                black_box(Action::View(BenchAction::Increment)),
                &(),
            );
        });
    });

    group.bench_function("set_value", |b| {
        let mut state = StateContainer::from(BenchState::default());
        b.iter(|| {
            let _effect = reducer.reduce(
                &mut state,
                black_box(Action::View(BenchAction::SetValue(42))),
                &(),
            );
        });
    });

    group.finish();
}

/// Benchmark Store throughput (actions/sec)
fn benchmark_store_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_throughput");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("send_no_effect", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send(black_box(BenchAction::Increment));
        });
    });

    group.bench_function("send_recording", |b| {
        let store = store(true);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send(black_box(BenchAction::Increment));
        });
    });

    group.bench_function("send_and_read_state", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send(black_box(BenchAction::Increment));
            let _value = store.state(|s| s.counter);
        });
    });

    group.finish();
}

/// Benchmark effect interpretation overhead
fn benchmark_effect_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_overhead");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("run_send_and_wait", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send_and_wait(black_box(BenchAction::RunOnce)).await;
        });
    });

    group.bench_function("fanout_16", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send_and_wait(black_box(BenchAction::Fanout(16))).await;
        });
    });

    group.bench_function("cancellable_cancel_in_flight", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send_and_wait(black_box(BenchAction::Tagged)).await;
        });
    });

    group.bench_function("debounce_zero_delay", |b| {
        let store = store(false);
        b.to_async(&runtime).iter(|| async {
            let _ = store.send_and_wait(black_box(BenchAction::Debounced)).await;
        });
    });

    group.finish();
}

/// Benchmark concurrent Store access
fn benchmark_concurrent_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(10));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("10_concurrent_sends", |b| {
        let store = store(false);

        b.to_async(&runtime).iter(|| async {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let _ = store.send(BenchAction::Increment);
                    })
                })
                .collect();

            for handle in handles {
                handle.await.expect("Task failed");
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_reducer_execution,
    benchmark_store_throughput,
    benchmark_effect_overhead,
    benchmark_concurrent_access,
);
criterion_main!(benches);
