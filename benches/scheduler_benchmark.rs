//! Scheduler benchmark suite for Fibra.
//!
//! Benchmarks the performance of scheduling primitives and of whole fibers:
//! - ReadyQueue: lock-free FIFO of runnable fibers
//! - TimerHeap: deadline registration and expiry
//! - Arena: generational slot allocation backing the registry
//! - Fiber lifecycle: fork + join, yield ping-pong, interrupt round trips
//!
//! Performance targets:
//! - ReadyQueue push/pop: < 100ns
//! - TimerHeap insert + pop_expired: < 200ns per timer
//! - fork + join on a current-thread runtime: < 5us

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use fibra::runtime::scheduler::ReadyQueue;
use fibra::runtime::timer::TimerHeap;
use fibra::runtime::{Runtime, RuntimeBuilder};
use fibra::types::{Cause, FiberId, Time};
use fibra::util::Arena;
use std::sync::Arc;
use std::task::{Wake, Waker};
use std::time::Duration;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

struct Noop;

impl Wake for Noop {
    fn wake(self: Arc<Self>) {}
}

fn noop_waker() -> Waker {
    Waker::from(Arc::new(Noop))
}

fn fibers(count: usize) -> Vec<FiberId> {
    (0..count as u32)
        .map(|slot| FiberId::new_for_test(slot, 0))
        .collect()
}

fn current_thread() -> Runtime {
    RuntimeBuilder::current_thread()
        .build()
        .expect("failed to build runtime")
}

// =============================================================================
// READY QUEUE BENCHMARKS
// =============================================================================

fn bench_ready_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/ready_queue");

    group.bench_function("push_pop_single", |b| {
        let queue = ReadyQueue::new();
        let id = FiberId::new_for_test(1, 0);
        b.iter(|| {
            queue.push(id);
            black_box(queue.pop())
        })
    });

    for &count in &[10u64, 100, 1000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::new("push_then_pop", count),
            &count,
            |b, &count| {
                let ids = fibers(count as usize);
                b.iter_batched(
                    || (ReadyQueue::new(), ids.clone()),
                    |(queue, ids)| {
                        for id in &ids {
                            queue.push(*id);
                        }
                        while let Some(id) = queue.pop() {
                            black_box(id);
                        }
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

// =============================================================================
// TIMER BENCHMARKS
// =============================================================================

fn bench_timers(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/timers");

    for &count in &[10u64, 100, 1000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::new("insert_then_expire", count),
            &count,
            |b, &count| {
                let waker = noop_waker();
                b.iter_batched(
                    TimerHeap::new,
                    |mut heap| {
                        for n in 0..count {
                            let _ = heap.insert(Time::from_nanos(count - n), waker.clone());
                        }
                        black_box(heap.pop_expired(Time::from_nanos(count + 1)))
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.bench_function("insert_cancel", |b| {
        let waker = noop_waker();
        b.iter_batched(
            TimerHeap::new,
            |mut heap| {
                for n in 0..100 {
                    let (key, _) = heap.insert(Time::from_nanos(n), waker.clone());
                    heap.cancel(key);
                }
                black_box(heap.next_deadline())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// =============================================================================
// ARENA BENCHMARKS
// =============================================================================

fn bench_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/arena");

    group.bench_function("insert_remove_churn", |b| {
        b.iter_batched(
            Arena::<u64>::new,
            |mut arena| {
                for n in 0..256u64 {
                    if let Some(idx) = arena.insert(n) {
                        if n % 2 == 0 {
                            black_box(arena.remove(idx));
                        }
                    }
                }
                arena
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// =============================================================================
// CAUSE BENCHMARKS
// =============================================================================

fn bench_cause(c: &mut Criterion) {
    let mut group = c.benchmark_group("types/cause");

    let wide = (0..64).fold(Cause::empty(), |acc, n| Cause::parallel(acc, Cause::fail(n)));
    group.bench_function("collect_failures_64", |b| {
        b.iter_batched(
            || wide.clone(),
            |cause| black_box(cause.collect_failures()),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("structural_eq_64", |b| {
        let other = wide.clone();
        b.iter(|| black_box(wide == other))
    });

    group.finish();
}

// =============================================================================
// FIBER LIFECYCLE BENCHMARKS
// =============================================================================

fn bench_fibers(c: &mut Criterion) {
    let mut group = c.benchmark_group("runtime/fibers");

    group.bench_function("run_trivial", |b| {
        let runtime = current_thread();
        b.iter(|| black_box(runtime.run_exit(|_cx| async { Ok::<_, ()>(1u8) })))
    });

    for &count in &[10u64, 100, 1000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("fork_join", count), &count, |b, &count| {
            let runtime = current_thread();
            b.iter(|| {
                runtime.run_exit(move |cx| async move {
                    let handles: Vec<_> = (0..count)
                        .map(|n| cx.fork(move |_cx| async move { Ok::<_, ()>(n) }))
                        .collect();
                    let mut sum = 0;
                    for handle in &handles {
                        sum += handle.join().await.unwrap();
                    }
                    Ok::<_, ()>(sum)
                })
            })
        });
    }

    group.bench_function("yield_ping_pong_1000", |b| {
        let runtime = current_thread();
        b.iter(|| {
            runtime.run_exit(|cx| async move {
                let other = cx.fork(|cx| async move {
                    for _ in 0..500 {
                        cx.yield_now().await;
                    }
                    Ok::<_, ()>(())
                });
                for _ in 0..500 {
                    cx.yield_now().await;
                }
                other.join().await
            })
        })
    });

    group.bench_function("interrupt_sleeping_child", |b| {
        let runtime = current_thread();
        b.iter(|| {
            runtime.run_exit(|cx| async move {
                let child = cx.fork(|cx| async move {
                    cx.sleep(Duration::from_secs(60)).await;
                    Ok::<_, ()>(())
                });
                cx.yield_now().await;
                Ok::<_, ()>(child.interrupt().await.is_interrupted())
            })
        })
    });

    group.bench_function("fork_join_multi_thread_1000", |b| {
        let runtime = RuntimeBuilder::multi_thread()
            .worker_threads(4)
            .build()
            .expect("failed to build runtime");
        b.iter(|| {
            runtime.run_exit(|cx| async move {
                let handles: Vec<_> = (0..1000u64)
                    .map(|n| cx.fork(move |_cx| async move { Ok::<_, ()>(n) }))
                    .collect();
                let mut sum = 0;
                for handle in &handles {
                    sum += handle.join().await.unwrap();
                }
                Ok::<_, ()>(sum)
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ready_queue,
    bench_timers,
    bench_arena,
    bench_cause,
    bench_fibers,
);

criterion_main!(benches);
