#![allow(missing_docs)]

//! Scheduler behaviour: FIFO fairness between ready fibers, timers that
//! fire while other fibers spin, blocking work off the scheduler, and the
//! runtime handle lifecycle.

#[macro_use]
mod common;

use common::*;
use fibra::runtime::RuntimeBuilder;
use fibra::types::{Cause, Exit};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

#[test]
fn yielding_fibers_alternate() {
    init_test("yielding_fibers_alternate");
    const ROUNDS: usize = 8;
    let trace = Arc::new(Mutex::new(Vec::new()));
    let (a_trace, b_trace) = (Arc::clone(&trace), Arc::clone(&trace));

    let exit = run_test(move |cx| async move {
        let a = cx.fork(move |cx| async move {
            for _ in 0..ROUNDS {
                a_trace.lock().push('a');
                cx.yield_now().await;
            }
            Ok::<_, ()>(())
        });
        let b = cx.fork(move |cx| async move {
            for _ in 0..ROUNDS {
                b_trace.lock().push('b');
                cx.yield_now().await;
            }
            Ok::<_, ()>(())
        });
        let left = a.join().await;
        let right = b.join().await;
        Ok::<_, ()>(left.combine_parallel(right, |(), ()| ()))
    });

    assert_eq!(exit.unwrap(), Exit::Success(()));
    let trace: String = trace.lock().iter().collect();
    assert_eq!(trace, "ab".repeat(ROUNDS));
    test_complete!("yielding_fibers_alternate");
}

#[test]
fn timers_fire_while_others_spin() {
    init_test("timers_fire_while_others_spin");
    let stop = Arc::new(AtomicBool::new(false));
    let (spinner_stop, sleeper_stop) = (Arc::clone(&stop), Arc::clone(&stop));

    let exit = run_test(move |cx| async move {
        let spinner = cx.fork(move |cx| async move {
            let mut spins = 0u64;
            while !spinner_stop.load(Ordering::SeqCst) {
                spins += 1;
                cx.yield_now().await;
            }
            Ok::<_, ()>(spins)
        });
        let sleeper = cx.fork(move |cx| async move {
            cx.sleep(Duration::from_millis(10)).await;
            sleeper_stop.store(true, Ordering::SeqCst);
            Ok::<_, ()>(())
        });
        let _ = sleeper.join().await;
        Ok::<_, ()>(spinner.join().await)
    });

    let spins = exit.unwrap().unwrap();
    assert!(spins > 0);
    test_complete!("timers_fire_while_others_spin");
}

#[test]
fn blocking_work_does_not_stall_other_fibers() {
    init_test("blocking_work_does_not_stall_other_fibers");
    let progress = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&progress);

    let exit = run_test(move |cx| async move {
        let _ticker = cx.fork(move |cx| async move {
            while counter.fetch_add(1, Ordering::SeqCst) < usize::MAX / 2 {
                cx.sleep(Duration::from_millis(1)).await;
            }
            Ok::<(), ()>(())
        });
        let value = cx
            .spawn_blocking(|| {
                std::thread::sleep(Duration::from_millis(50));
                42
            })
            .await;
        Ok::<_, ()>(value)
    });

    assert_eq!(exit.unwrap(), 42);
    assert!(progress.load(Ordering::SeqCst) > 1, "ticker must run meanwhile");
    test_complete!("blocking_work_does_not_stall_other_fibers");
}

#[test]
fn many_fibers_on_a_worker_pool() {
    init_test("many_fibers_on_a_worker_pool");
    const FIBERS: u64 = 1_000;

    let exit = run_test_with_workers(4, |cx| async move {
        let handles: Vec<_> = (0..FIBERS)
            .map(|n| {
                cx.fork(move |cx| async move {
                    cx.yield_now().await;
                    Ok::<_, ()>(n)
                })
            })
            .collect();
        let mut sum = 0;
        for handle in &handles {
            sum += handle.join().await.unwrap();
        }
        Ok::<_, ()>(sum)
    });

    assert_eq!(exit.unwrap(), FIBERS * (FIBERS - 1) / 2);
    test_complete!("many_fibers_on_a_worker_pool", fibers = FIBERS);
}

#[test]
fn panicking_fiber_does_not_take_down_the_worker() {
    init_test("panicking_fiber_does_not_take_down_the_worker");
    let exit = run_test_with_workers(2, |cx| async move {
        let bad = cx.fork(|_cx| async {
            let fail = true;
            if fail {
                panic!("worker must survive");
            }
            Ok::<u8, ()>(0)
        });
        let died = bad.join().await;
        let good = cx.fork(|_cx| async { Ok::<u8, ()>(1) }).join().await;
        Ok::<_, ()>((died, good))
    });

    let (died, good) = exit.unwrap();
    assert_eq!(
        died.cause().map(|c| c.defects()[0].message().to_string()),
        Some("worker must survive".to_string())
    );
    assert_eq!(good, Exit::Success(1));
    test_complete!("panicking_fiber_does_not_take_down_the_worker");
}

#[test]
fn panic_while_building_a_fiber_fails_only_that_fiber() {
    init_test("panic_while_building_a_fiber_fails_only_that_fiber");
    let (exit, elapsed) = timed(|| {
        run_test(|cx| async move {
            let bad = cx.fork(|_cx| -> std::future::Ready<Result<u8, ()>> {
                panic!("effect constructor panicked")
            });
            let died = bad.join().await;
            let after = cx.fork(|_cx| async { Ok::<u8, ()>(2) }).join().await;
            Ok::<_, ()>((died, after, cx.runtime_handle().snapshot().live_fibers))
        })
    });

    let (died, after, live) = exit.unwrap();
    assert_eq!(
        died.cause().map(|c| c.defects()[0].message().to_string()),
        Some("effect constructor panicked".to_string())
    );
    assert_eq!(after, Exit::Success(2));
    // Only the running parent is left in the registry.
    assert_with_log!(live == 1, "no orphaned fiber slot", 1, live);
    assert!(elapsed < Duration::from_secs(5), "run took {elapsed:?}");
    test_complete!("panic_while_building_a_fiber_fails_only_that_fiber");
}

// ============================================================================
// Runtime surface
// ============================================================================

#[test]
fn run_flattens_failures_into_fiber_failure() {
    init_test("run_flattens_failures_into_fiber_failure");
    let runtime = RuntimeBuilder::current_thread().build().expect("runtime");

    let ok = runtime.run(|_cx| async { Ok::<_, &str>(3) });
    assert_eq!(ok.ok(), Some(3));

    let err = runtime
        .run(|_cx| async { Err::<(), _>("broken") })
        .expect_err("failure expected");
    assert_eq!(err.cause(), &Cause::fail("broken"));
    assert!(err.to_string().contains("broken"));
    test_complete!("run_flattens_failures_into_fiber_failure");
}

#[test]
fn handle_forks_root_fibers_and_reports_counters() {
    init_test("handle_forks_root_fibers_and_reports_counters");
    let runtime = RuntimeBuilder::current_thread().build().expect("runtime");
    let handle = runtime.handle();

    let background = handle.fork(|cx| async move {
        cx.sleep(Duration::from_millis(5)).await;
        Ok::<_, ()>("background")
    });
    assert_eq!(runtime.snapshot().live_fibers, 1);

    let exit = runtime.run_exit(move |_cx| async move { background.join().await });
    assert_eq!(exit, Exit::Success("background"));
    assert_eq!(runtime.snapshot().live_fibers, 0);
    assert!(!handle.is_shutdown());

    drop(runtime);
    assert!(handle.is_shutdown());
    let rejected = handle.fork(|_cx| async { Ok::<_, ()>(()) });
    assert!(rejected.is_finished());
    assert!(rejected.try_join().is_some_and(|e| e.cause().is_some_and(|c| c.is_die())));
    assert_eq!(handle.snapshot(), fibra::runtime::RuntimeSnapshot::default());
    test_complete!("handle_forks_root_fibers_and_reports_counters");
}

#[test]
fn handle_interrupts_from_outside() {
    init_test("handle_interrupts_from_outside");
    let runtime = RuntimeBuilder::multi_thread()
        .worker_threads(2)
        .build()
        .expect("runtime");
    let handle = runtime.handle();

    let sleeper = handle.fork(|cx| async move {
        cx.sleep(Duration::from_secs(10)).await;
        Ok::<_, ()>(())
    });
    let target = sleeper.id();
    let exit = runtime.run_exit(move |cx| async move {
        cx.sleep(Duration::from_millis(5)).await;
        let sent = cx.runtime_handle().interrupt(target);
        Ok::<_, ()>((sent, sleeper.join().await))
    });

    let (sent, sleeper_exit) = exit.unwrap();
    assert!(sent);
    assert!(sleeper_exit.is_interrupted());
    assert_eq!(
        sleeper_exit.cause().map(|c| c.interruptors()),
        Some(vec![fibra::FiberId::NONE])
    );
    test_complete!("handle_interrupts_from_outside");
}
