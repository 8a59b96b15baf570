//! Runtime builder, runtime and handles.

use super::config::RuntimeConfig;
use super::env_config;
use super::fiber_handle::FiberHandle;
use super::scheduler::Worker;
use super::state::{Link, RuntimeSnapshot, RuntimeState};
use super::waker::thread_waker;
use crate::cx::Cx;
use crate::error::{Error, ErrorKind, FiberFailure, Result};
use crate::tracing_compat::{debug, info};
use crate::types::{BuildError, Exit, FiberId, IntoExit};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound accepted for `worker_threads`.
pub const MAX_WORKER_THREADS: usize = 1024;

/// Builder for a [`Runtime`].
///
/// Every method consumes the builder and returns it, so calls chain:
///
/// ```ignore
/// let runtime = RuntimeBuilder::multi_thread()
///     .worker_threads(4)
///     .thread_name_prefix("app")
///     .with_env_overrides()?
///     .build()?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime that drives every fiber on the thread calling `run`.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::new().worker_threads(1)
    }

    /// Runtime with one worker per available CPU.
    #[must_use]
    pub fn multi_thread() -> Self {
        Self::new().worker_threads(RuntimeConfig::default_worker_threads().max(2))
    }

    /// Number of worker threads. One means current-thread.
    #[must_use]
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Stack size of worker and blocking threads.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Prefix of worker thread names.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Name of threads started by `spawn_blocking`.
    #[must_use]
    pub fn blocking_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.blocking_thread_name = name.into();
        self
    }

    /// Park idle workers instead of spinning with `yield_now`.
    #[must_use]
    pub fn enable_parking(mut self, enable: bool) -> Self {
        self.config.enable_parking = enable;
        self
    }

    /// Consecutive in-place polls granted to a self-waking fiber.
    #[must_use]
    pub fn poll_budget(mut self, budget: u32) -> Self {
        self.config.poll_budget = budget;
        self
    }

    /// Longest single park of an idle worker.
    #[must_use]
    pub fn park_timeout(mut self, timeout: Duration) -> Self {
        self.config.park_timeout = timeout;
        self
    }

    /// Callback run on each worker thread when it starts.
    #[must_use]
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_start = Some(Arc::new(f));
        self
    }

    /// Callback run on each worker thread when it stops.
    #[must_use]
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_stop = Some(Arc::new(f));
        self
    }

    /// Applies `FIBRA_*` environment variables on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn with_env_overrides(mut self) -> std::result::Result<Self, BuildError> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// The configuration as currently set.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Builds the runtime, starting its worker threads.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for out-of-range values, `ThreadSpawn` when a worker
    /// thread cannot be started.
    pub fn build(self) -> Result<Runtime> {
        Runtime::with_config(self.config)
    }
}

/// A fiber runtime.
///
/// Dropping it stops the workers and drops every fiber that has not finished;
/// their finalizers do not run.
pub struct Runtime {
    state: Arc<RuntimeState>,
    workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Runtime from an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`RuntimeBuilder::build`].
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self> {
        config.normalize();
        if config.worker_threads > MAX_WORKER_THREADS {
            return Err(BuildError::invalid_value(
                "worker_threads",
                format!("must be at most {MAX_WORKER_THREADS}"),
            )
            .into());
        }

        let state = RuntimeState::new(config);
        let mut runtime = Self {
            state,
            workers: Vec::new(),
        };
        if !runtime.state.config().is_current_thread() {
            runtime.start_workers()?;
        }
        info!(
            workers = runtime.state.config().worker_threads,
            current_thread = runtime.workers.is_empty(),
            "runtime started"
        );
        Ok(runtime)
    }

    fn start_workers(&mut self) -> Result<()> {
        let config = self.state.config();
        for n in 0..config.worker_threads {
            let worker = Worker::new(Arc::clone(&self.state));
            let name = format!("{}-{n}", config.thread_name_prefix);
            debug!(worker_id = worker.id(), thread = %name, "spawning worker");
            let spawned = thread::Builder::new()
                .name(name.clone())
                .stack_size(config.thread_stack_size)
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => self.workers.push(handle),
                // Drop joins what was started so far.
                Err(err) => return Err(Error::thread_spawn(&name, err)),
            }
        }
        Ok(())
    }

    /// Runs `effect` as the main fiber and returns its exit.
    ///
    /// Never fails: every outcome, panics included, is an [`Exit`].
    pub fn run_exit<F, Fut, T, E>(&self, effect: F) -> Exit<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        let handle = self.state.fork(Link::Root, effect);
        if self.workers.is_empty() {
            let worker = Worker::new(Arc::clone(&self.state));
            worker.run_until(|| handle.is_finished());
            return handle
                .try_join()
                .unwrap_or_else(|| Exit::die("runtime stopped before the main fiber finished"));
        }

        let waker = thread_waker();
        let mut cx = Context::from_waker(&waker);
        let mut join = handle.join();
        loop {
            if let Poll::Ready(exit) = Pin::new(&mut join).poll(&mut cx) {
                return exit;
            }
            thread::park_timeout(self.state.config().park_timeout);
        }
    }

    /// Runs `effect` as the main fiber, turning a failed exit into an error.
    ///
    /// # Errors
    ///
    /// A [`FiberFailure`] holding the full cause when the main fiber did not
    /// succeed.
    pub fn run<F, Fut, T, E>(&self, effect: F) -> std::result::Result<T, FiberFailure<E>>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        self.run_exit(effect).into_result().map_err(FiberFailure::new)
    }

    /// Handle usable from any thread.
    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            state: self.state.downgrade(),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> RuntimeSnapshot {
        self.state.snapshot()
    }

    /// The configuration in effect, after normalization.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.state.config()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.state.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                debug!("worker thread panicked");
            }
        }
        self.state.reap();
        info!("runtime shut down");
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("workers", &self.workers.len())
            .field("snapshot", &self.state.snapshot())
            .finish()
    }
}

/// Cheap, clonable access to a runtime from outside its fibers.
///
/// The handle does not keep the runtime alive. After shutdown, forks return
/// handles that are already finished with a defect.
#[derive(Clone)]
pub struct RuntimeHandle {
    state: Weak<RuntimeState>,
}

impl RuntimeHandle {
    pub(crate) fn from_state(state: &RuntimeState) -> Self {
        Self {
            state: state.downgrade(),
        }
    }

    /// Forks a root fiber. Root fibers have no supervising parent.
    ///
    /// After shutdown the returned handle is already finished with a defect;
    /// use [`try_fork`](Self::try_fork) to get an error instead.
    pub fn fork<F, Fut, T, E>(&self, effect: F) -> FiberHandle<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        self.try_fork(effect)
            .unwrap_or_else(|err| FiberHandle::rejected(FiberId::NONE, &err.to_string()))
    }

    /// Forks a root fiber, failing with [`ErrorKind::RuntimeShutdown`] once
    /// the runtime is shutting down or gone.
    pub fn try_fork<F, Fut, T, E>(&self, effect: F) -> Result<FiberHandle<T, E>>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        match self.state.upgrade() {
            Some(state) if !state.is_shutdown() => Ok(state.fork(Link::Root, effect)),
            _ => Err(Error::new(ErrorKind::RuntimeShutdown).with_message("runtime is shut down")),
        }
    }

    /// Sends an interrupt to `target`. Returns false when no such fiber is
    /// live.
    pub fn interrupt(&self, target: FiberId) -> bool {
        self.state
            .upgrade()
            .and_then(|state| state.interrupt(target, FiberId::NONE))
            .is_some()
    }

    /// Current counters; all zero once the runtime is gone.
    #[must_use]
    pub fn snapshot(&self) -> RuntimeSnapshot {
        self.state
            .upgrade()
            .map(|state| state.snapshot())
            .unwrap_or_default()
    }

    /// True once the runtime started shutting down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state
            .upgrade()
            .map_or(true, |state| state.is_shutdown())
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
