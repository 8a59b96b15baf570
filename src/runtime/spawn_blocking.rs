//! Blocking work on dedicated threads.
//!
//! The closure runs on its own named thread; the awaiting fiber is suspended,
//! never the worker that polled it.
//!
//! # Cancellation
//!
//! Dropping the returned future (for instance because the fiber was
//! interrupted) does not stop the thread. The closure runs to completion and
//! its result is discarded.
//!
//! # Panics
//!
//! A panic in the closure is resumed in the awaiting fiber, where the fiber
//! driver turns it into a defect.

use super::config::RuntimeConfig;
use crate::tracing_compat::{trace, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;

type Payload = Box<dyn std::any::Any + Send>;

struct Shared<R> {
    result: Option<thread::Result<R>>,
    waker: Option<Waker>,
}

/// Future resolving to the closure's return value.
pub struct BlockingTask<R> {
    shared: Arc<Mutex<Shared<R>>>,
}

impl<R> std::fmt::Debug for BlockingTask<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTask")
            .field("done", &self.shared.lock().result.is_some())
            .finish()
    }
}

/// Starts `f` on a dedicated thread named after
/// [`RuntimeConfig::blocking_thread_name`].
///
/// If the thread cannot be spawned the closure runs inline on the caller.
pub(crate) fn spawn_blocking<F, R>(config: &RuntimeConfig, f: F) -> BlockingTask<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let shared = Arc::new(Mutex::new(Shared {
        result: None,
        waker: None,
    }));
    // The closure is parked here so that it can be recovered if the spawn
    // fails; `Builder::spawn` consumes its argument either way.
    let job = Arc::new(Mutex::new(Some(f)));

    let spawned = {
        let shared = Arc::clone(&shared);
        let job = Arc::clone(&job);
        thread::Builder::new()
            .name(config.blocking_thread_name.clone())
            .stack_size(config.thread_stack_size)
            .spawn(move || {
                let Some(f) = job.lock().take() else {
                    return;
                };
                trace!("blocking job started");
                complete(&shared, catch_unwind(AssertUnwindSafe(f)));
            })
    };

    if let Err(err) = spawned {
        warn!(error = %err, "could not spawn blocking thread, running inline");
        if let Some(f) = job.lock().take() {
            complete(&shared, catch_unwind(AssertUnwindSafe(f)));
        }
    }

    BlockingTask { shared }
}

fn complete<R>(shared: &Mutex<Shared<R>>, result: Result<R, Payload>) {
    let waker = {
        let mut shared = shared.lock();
        shared.result = Some(result);
        shared.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
}

impl<R> Future for BlockingTask<R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let mut shared = self.shared.lock();
        match shared.result.take() {
            Some(Ok(value)) => Poll::Ready(value),
            Some(Err(payload)) => {
                drop(shared);
                resume_unwind(payload)
            }
            None => {
                match &mut shared.waker {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    slot => *slot = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
        }
    }
}
