//! Runtime configuration.
//!
//! Use [`RuntimeBuilder`](super::builder::RuntimeBuilder) rather than filling
//! a [`RuntimeConfig`] by hand.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_threads` | available CPU parallelism |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"fibra-worker"` |
//! | `blocking_thread_name` | `"fibra-blocking"` |
//! | `enable_parking` | true |
//! | `poll_budget` | 32 |
//! | `park_timeout` | 50 ms |
//!
//! With `worker_threads == 1` no thread is spawned: the thread calling
//! [`Runtime::run`](super::Runtime::run) drives every fiber.

use std::sync::Arc;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_WORKER_PREFIX: &str = "fibra-worker";
const DEFAULT_BLOCKING_NAME: &str = "fibra-blocking";
const DEFAULT_POLL_BUDGET: u32 = 32;
const DEFAULT_PARK_TIMEOUT: Duration = Duration::from_millis(50);

/// Runtime configuration.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Worker threads. One means "drive fibers on the calling thread".
    pub worker_threads: usize,
    /// Stack size of worker and blocking threads.
    pub thread_stack_size: usize,
    /// Worker threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
    /// Name given to threads started by `spawn_blocking`.
    pub blocking_thread_name: String,
    /// Park idle workers on a condvar instead of yielding the thread.
    pub enable_parking: bool,
    /// Consecutive quanta a self-waking fiber may take while nothing else is
    /// ready.
    pub poll_budget: u32,
    /// Upper bound on a single park, so workers notice shutdown promptly.
    pub park_timeout: Duration,
    /// Called on each worker thread before it starts polling.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Called on each worker thread after it stops polling.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl RuntimeConfig {
    /// Replaces unusable values with defaults.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_STACK_SIZE;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_WORKER_PREFIX.to_string();
        }
        if self.blocking_thread_name.is_empty() {
            self.blocking_thread_name = DEFAULT_BLOCKING_NAME.to_string();
        }
        if self.poll_budget == 0 {
            self.poll_budget = 1;
        }
        if self.park_timeout.is_zero() {
            self.park_timeout = DEFAULT_PARK_TIMEOUT;
        }
    }

    /// True when fibers are driven by the calling thread.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        self.worker_threads <= 1
    }

    pub(crate) fn default_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: Self::default_worker_threads(),
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: DEFAULT_WORKER_PREFIX.to_string(),
            blocking_thread_name: DEFAULT_BLOCKING_NAME.to_string(),
            enable_parking: true,
            poll_budget: DEFAULT_POLL_BUDGET,
            park_timeout: DEFAULT_PARK_TIMEOUT,
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("worker_threads", &self.worker_threads)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("blocking_thread_name", &self.blocking_thread_name)
            .field("enable_parking", &self.enable_parking)
            .field("poll_budget", &self.poll_budget)
            .field("park_timeout", &self.park_timeout)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}
