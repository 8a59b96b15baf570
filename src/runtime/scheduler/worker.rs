//! Worker loop.

use super::parker::Parker;
use crate::runtime::state::{AfterPoll, RuntimeState};
use crate::tracing_compat::{debug, debug_span, trace};
use crate::types::{Cause, Defect, Exit};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Identifier for a worker.
pub type WorkerId = usize;

/// Drives fibers from the shared ready queue.
///
/// A multi-threaded runtime runs one per worker thread. A current-thread
/// runtime builds one on the calling thread for the duration of `run`.
#[derive(Debug)]
pub(crate) struct Worker {
    id: WorkerId,
    runtime: Arc<RuntimeState>,
    parker: Parker,
}

impl Worker {
    pub(crate) fn new(runtime: Arc<RuntimeState>) -> Self {
        Self {
            id: runtime.next_worker_id(),
            runtime,
            parker: Parker::new(),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Thread body: runs until the runtime shuts down.
    pub(crate) fn run(&self) {
        if let Some(hook) = &self.runtime.config().on_thread_start {
            hook();
        }
        debug!(worker_id = self.id, "worker started");
        while !self.runtime.is_shutdown() {
            if !self.tick() {
                self.idle();
            }
        }
        debug!(worker_id = self.id, "worker stopped");
        if let Some(hook) = &self.runtime.config().on_thread_stop {
            hook();
        }
    }

    /// Runs until `done` holds or the runtime shuts down.
    pub(crate) fn run_until(&self, mut done: impl FnMut() -> bool) {
        while !done() && !self.runtime.is_shutdown() {
            if !self.tick() {
                self.idle();
            }
        }
    }

    /// Fires due timers and runs one fiber. Returns false when there was
    /// nothing to do.
    fn tick(&self) -> bool {
        let fired = self.runtime.fire_timers();
        match self.runtime.ready.pop() {
            Some(id) => {
                self.run_fiber(id);
                true
            }
            None => fired > 0,
        }
    }

    /// Polls one fiber for a quantum.
    ///
    /// A fiber that wakes itself goes back to the tail of the queue. When
    /// nothing else is ready it is polled again in place, at most
    /// `poll_budget` times in a row.
    fn run_fiber(&self, id: crate::types::FiberId) {
        let budget = self.runtime.config().poll_budget.max(1);
        for quantum in 1..=budget {
            let Some((mut future, waker)) = self.runtime.begin_poll(id) else {
                trace!(fiber_id = %id, "queued fiber has no future");
                return;
            };
            let mut cx = Context::from_waker(&waker);
            let _span = debug_span!("fiber_poll", fiber_id = %id, worker_id = self.id).entered();
            trace!(quantum, "polling fiber");

            match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
                Ok(Poll::Ready(())) => {
                    drop(future);
                    self.runtime.finish_fiber(id);
                    return;
                }
                Ok(Poll::Pending) => match self.runtime.end_poll(id, future) {
                    AfterPoll::Requeue => {
                        if quantum < budget && self.runtime.ready.is_empty() {
                            continue;
                        }
                        self.runtime.requeue(id);
                        return;
                    }
                    AfterPoll::Parked | AfterPoll::Gone => return,
                },
                Err(payload) => {
                    drop(future);
                    let defect = Defect::from_panic(payload.as_ref());
                    self.runtime
                        .abort_fiber(id, Exit::Failure(Cause::die(defect)));
                    return;
                }
            }
        }
    }

    fn idle(&self) {
        if !self.runtime.config().enable_parking {
            std::thread::yield_now();
            return;
        }
        self.runtime.idle.register(self.id, &self.parker);
        // A fiber may have been queued between the failed pop and the
        // registration; its unpark would have found nobody.
        if !self.runtime.ready.is_empty() || self.runtime.is_shutdown() {
            self.runtime.idle.deregister(self.id);
            return;
        }
        let timeout = self.runtime.park_timeout();
        if !timeout.is_zero() {
            trace!(worker_id = self.id, ?timeout, "worker parking");
            self.parker.park_timeout(timeout);
            trace!(worker_id = self.id, "worker unparked");
        }
        self.runtime.idle.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::RuntimeConfig;
    use crate::runtime::state::Link;
    use parking_lot::Mutex;

    fn state() -> Arc<RuntimeState> {
        RuntimeState::new(RuntimeConfig {
            worker_threads: 1,
            ..RuntimeConfig::default()
        })
    }

    #[test]
    fn runs_a_fiber_to_completion() {
        let rt = state();
        let handle = rt.fork(Link::Root, |_cx| async { Ok::<_, ()>(5) });
        let worker = Worker::new(Arc::clone(&rt));
        worker.run_until(|| handle.is_finished());
        assert_eq!(handle.try_join(), Some(Exit::Success(5)));
        assert_eq!(rt.snapshot().live_fibers, 0);
    }

    #[test]
    fn yielding_fibers_alternate() {
        let rt = state();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for tag in ['a', 'b'] {
            let log = Arc::clone(&log);
            handles.push(rt.fork(Link::Root, move |cx| async move {
                for _ in 0..3 {
                    log.lock().push(tag);
                    cx.yield_now().await;
                }
                Ok::<_, ()>(())
            }));
        }
        let worker = Worker::new(Arc::clone(&rt));
        worker.run_until(|| handles.iter().all(|h| h.is_finished()));
        assert_eq!(*log.lock(), vec!['a', 'b', 'a', 'b', 'a', 'b']);
    }

    #[test]
    fn panicking_body_becomes_a_defect() {
        let rt = state();
        let handle = rt.fork(Link::Root, |_cx| async {
            if true {
                panic!("boom");
            }
            Ok::<u8, ()>(0)
        });
        let worker = Worker::new(Arc::clone(&rt));
        worker.run_until(|| handle.is_finished());
        let exit = handle.try_join().unwrap();
        let cause = exit.cause().unwrap();
        assert!(cause.is_die());
        assert_eq!(cause.defects()[0].message(), "boom");
    }

    #[test]
    fn workers_get_distinct_ids() {
        let rt = state();
        let a = Worker::new(Arc::clone(&rt));
        let b = Worker::new(Arc::clone(&rt));
        assert_ne!(a.id(), b.id());
    }
}
