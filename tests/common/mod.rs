#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use fibra::cx::Cx;
use fibra::runtime::RuntimeBuilder;
use fibra::types::{Exit, IntoExit};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::fmt;
use std::future::Future;
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "FIBRA_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED)
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Run a fiber body as the main fiber of a fresh current-thread runtime.
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

/// Run a fiber body on a fresh runtime with `workers` worker threads.
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

/// Run `f` and return its output with the wall-clock time it took.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
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

/// Log test completion.
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
