//! Test utilities.
//!
//! Shared helpers for unit tests and, with the `test-internals` feature, for
//! downstream tests:
//! - tracing-based logging initialization
//! - phase/section macros for readable test output
//! - runners that execute a fiber body on a fresh runtime
//! - exit assertion macros
//!
//! # Example
//! ```ignore
//! use fibra::test_utils::{init_test_logging, run_test};
//!
//! #[test]
//! fn forks_and_joins() {
//!     init_test_logging();
//!     let exit = run_test(|cx| async move {
//!         let child = cx.fork(|_cx| async { Ok::<_, ()>(1) });
//!         child.join().await
//!     });
//!     fibra::assert_exit_success!(exit, 1);
//! }
//! ```

use crate::cx::Cx;
use crate::runtime::RuntimeBuilder;
use crate::types::{Exit, IntoExit};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Serializes tests that mutate process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `body` as the main fiber of a fresh current-thread runtime.
pub fn run_test<F, Fut, T, E>(body: F) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    run_test_with_workers(1, body)
}

/// Runs `body` as the main fiber of a fresh runtime with `workers` threads.
pub fn run_test_with_workers<F, Fut, T, E>(workers: usize, body: F) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    init_test_logging();
    let runtime = RuntimeBuilder::new()
        .worker_threads(workers)
        .build()
        .expect("failed to build test runtime");
    runtime.run_exit(body)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that an exit is a success, optionally with a specific value.
#[macro_export]
macro_rules! assert_exit_success {
    ($exit:expr) => {
        match $exit {
            $crate::types::Exit::Success(_) => {}
            other => unreachable!("expected Exit::Success, got {:?}", other),
        }
    };
    ($exit:expr, $expected:expr) => {
        match $exit {
            $crate::types::Exit::Success(v) => assert_eq!(v, $expected),
            other => unreachable!("expected Exit::Success({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that an exit failed with a cause containing a typed failure.
#[macro_export]
macro_rules! assert_exit_failure {
    ($exit:expr) => {
        match $exit {
            $crate::types::Exit::Failure(cause) if cause.is_failure() => {}
            other => unreachable!("expected a typed failure, got {:?}", other),
        }
    };
}

/// Assert that an exit failed with a cause containing an interruption.
#[macro_export]
macro_rules! assert_exit_interrupted {
    ($exit:expr) => {
        match $exit {
            $crate::types::Exit::Failure(cause) if cause.is_interrupted() => {}
            other => unreachable!("expected an interruption, got {:?}", other),
        }
    };
}

/// Assert that an exit failed with a cause containing a defect.
#[macro_export]
macro_rules! assert_exit_died {
    ($exit:expr) => {
        match $exit {
            $crate::types::Exit::Failure(cause) if cause.is_die() => {}
            other => unreachable!("expected a defect, got {:?}", other),
        }
    };
}
