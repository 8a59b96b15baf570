//! Shared runtime state.
//!
//! Everything a worker, a waker or a [`Cx`] needs to reach: the fiber
//! registry, the ready queue, the timer heap and the idle-worker list.
//!
//! Locks: the registry lock is taken before a fiber's context lock, never the
//! other way round. No waker is invoked and no fiber future is dropped while
//! the registry lock is held.

use super::config::RuntimeConfig;
use super::driver;
use super::fiber_handle::{FiberHandle, JoinCell};
use super::registry::{FiberFuture, FiberSlot, Registry};
use super::scheduler::parker::IdleWorkers;
use super::scheduler::ready_queue::ReadyQueue;
use super::timer::{Clock, TimerHeap, TimerKey};
use super::waker::fiber_waker;
use crate::cx::Cx;
use crate::record::{DoneSignal, InterruptDisposition, WakeState};
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{Cause, Defect, ErasedExit, Exit, FiberId, IntoExit, Time};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::Waker;
use std::time::Duration;

/// How a new fiber relates to the fiber that forked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    /// Forked from outside any fiber.
    Root,
    /// Supervised child of the given fiber.
    Child(FiberId),
    /// Forked by the given fiber but not supervised by it.
    Detached(FiberId),
}

impl Link {
    fn parent(self) -> Option<FiberId> {
        match self {
            Self::Child(parent) => Some(parent),
            Self::Root | Self::Detached(_) => None,
        }
    }

    fn owner(self) -> FiberId {
        match self {
            Self::Root => FiberId::NONE,
            Self::Child(id) | Self::Detached(id) => id,
        }
    }
}

/// What a worker should do with a fiber whose poll returned `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterPoll {
    /// Woken during the poll; already marked scheduled.
    Requeue,
    /// Waiting for a waker.
    Parked,
    /// The fiber left the registry while it was being polled.
    Gone,
}

/// Point-in-time view of the runtime, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSnapshot {
    /// Fibers in the registry, including ones tearing down.
    pub live_fibers: usize,
    /// Fibers waiting in the ready queue.
    pub ready_fibers: usize,
    /// Registered, not yet fired timers.
    pub pending_timers: usize,
    /// Workers currently parked.
    pub idle_workers: usize,
}

/// State shared by every part of a runtime.
pub(crate) struct RuntimeState {
    config: RuntimeConfig,
    clock: Clock,
    registry: Mutex<Registry>,
    pub(crate) ready: ReadyQueue,
    timers: Mutex<TimerHeap>,
    pub(crate) idle: IdleWorkers,
    shutdown: AtomicBool,
    next_worker: AtomicUsize,
    this: Weak<RuntimeState>,
}

impl RuntimeState {
    pub(crate) fn new(config: RuntimeConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            clock: Clock::start(),
            registry: Mutex::new(Registry::new()),
            ready: ReadyQueue::new(),
            timers: Mutex::new(TimerHeap::new()),
            idle: IdleWorkers::new(),
            shutdown: AtomicBool::new(false),
            next_worker: AtomicUsize::new(0),
            this: this.clone(),
        })
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Time {
        self.clock.now()
    }

    pub(crate) fn next_worker_id(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn downgrade(&self) -> Weak<Self> {
        self.this.clone()
    }

    /// Creates a fiber running `effect` and queues it.
    ///
    /// The effect is called here, on the forking thread, to build the body
    /// future. When the registry has no room left, or the effect panics
    /// before returning its future, the returned handle is already completed
    /// with a defect.
    pub(crate) fn fork<F, Fut, T, E>(self: &Arc<Self>, link: Link, effect: F) -> FiberHandle<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        let parent = link.parent();
        let detached = matches!(link, Link::Detached(_));
        let born = self.now();

        let reserved = {
            let mut registry = self.registry.lock();
            let weak = self.downgrade();
            let id = registry.reserve(born, parent, |id| fiber_waker(weak, id));
            id.and_then(|id| {
                if let Some(parent) = parent {
                    if let Some(slot) = registry.get_mut(parent) {
                        slot.record.adopt(id);
                    }
                }
                registry.get(id).map(|slot| {
                    (
                        id,
                        Arc::clone(&slot.record.context),
                        Arc::clone(&slot.record.done),
                    )
                })
            })
        };

        let Some((id, context, done)) = reserved else {
            error!(?parent, "fiber registry is full");
            return FiberHandle::rejected(link.owner(), "fiber registry is full");
        };

        let cell = Arc::new(JoinCell::new());
        let cx = Cx::new(context, Arc::clone(self));
        let body = match catch_unwind(AssertUnwindSafe(|| effect(cx.clone()))) {
            Ok(body) => body,
            Err(payload) => {
                let defect = Defect::from_panic(payload.as_ref());
                warn!(fiber_id = %id, message = defect.message(), "fiber effect panicked before start");
                self.complete_fiber(id, Exit::Failure(Cause::die(defect.clone())));
                self.finish_fiber(id);
                cell.complete(Exit::Failure(Cause::die(defect)));
                return FiberHandle::new(id, link.owner(), cell, done, self.downgrade());
            }
        };
        let future: FiberFuture = Box::pin(driver::drive(cx, body, Arc::clone(&cell)));
        if let Some(slot) = self.registry.lock().get_mut(id) {
            slot.future = Some(future);
        }

        debug!(fiber_id = %id, ?parent, detached, "fiber forked");
        self.schedule(id);
        FiberHandle::new(id, link.owner(), cell, done, self.downgrade())
    }

    fn schedule(&self, id: FiberId) {
        self.ready.push(id);
        self.idle.unpark_one();
    }

    /// Wakes a fiber. Queues it unless it is already queued or being polled.
    pub(crate) fn wake(&self, id: FiberId) {
        let enqueue = {
            let mut registry = self.registry.lock();
            let Some(slot) = registry.get_mut(id) else {
                return;
            };
            match slot.record.wake {
                WakeState::Idle => {
                    slot.record.wake = WakeState::Scheduled;
                    true
                }
                WakeState::Running => {
                    slot.record.wake = WakeState::Notified;
                    false
                }
                WakeState::Scheduled | WakeState::Notified => false,
            }
        };
        if enqueue {
            trace!(fiber_id = %id, "fiber woken");
            self.schedule(id);
        }
    }

    /// Sends an interrupt from `by` to `target`.
    ///
    /// Returns the target's completion signal, or `None` when no such fiber
    /// is live. Targets that are already done are left alone.
    pub(crate) fn interrupt(&self, target: FiberId, by: FiberId) -> Option<Arc<DoneSignal>> {
        let (done, disposition) = {
            let registry = self.registry.lock();
            let slot = registry.get(target)?;
            let done = Arc::clone(&slot.record.done);
            if slot.record.state.is_done() {
                return Some(done);
            }
            (done, slot.record.context.request_interrupt(by))
        };
        match disposition {
            InterruptDisposition::Deliver => {
                debug!(fiber_id = %target, by = %by, "interrupt requested");
                self.wake(target);
            }
            InterruptDisposition::Queued => {
                debug!(fiber_id = %target, by = %by, "interrupt queued");
            }
            InterruptDisposition::AlreadyPending => {
                trace!(fiber_id = %target, by = %by, "interrupt already pending");
            }
        }
        Some(done)
    }

    pub(crate) fn mark_interrupting(&self, id: FiberId) {
        if let Some(slot) = self.registry.lock().get_mut(id) {
            slot.record.begin_interrupting();
        }
    }

    /// Takes the supervised children of `id` that have not finished yet.
    pub(crate) fn take_children(&self, id: FiberId) -> Vec<FiberId> {
        let mut registry = self.registry.lock();
        let children = registry
            .get_mut(id)
            .map(|slot| std::mem::take(&mut slot.record.children))
            .unwrap_or_default();
        children
            .into_iter()
            .filter(|child| {
                registry
                    .get(*child)
                    .is_some_and(|slot| !slot.record.state.is_done())
            })
            .collect()
    }

    /// Moves a fiber to `Done` and releases everyone awaiting its erased exit.
    pub(crate) fn complete_fiber(&self, id: FiberId, exit: ErasedExit) {
        let done = {
            let mut registry = self.registry.lock();
            let Some(slot) = registry.get_mut(id) else {
                return;
            };
            if !slot.record.complete(exit.clone()) {
                return;
            }
            Arc::clone(&slot.record.done)
        };
        done.complete(exit);
    }

    /// Hands a queued fiber's future to a worker.
    pub(crate) fn begin_poll(&self, id: FiberId) -> Option<(FiberFuture, Waker)> {
        let mut registry = self.registry.lock();
        let slot = registry.get_mut(id)?;
        let future = slot.future.take()?;
        slot.record.wake = WakeState::Running;
        slot.record.resume();
        slot.record.polls += 1;
        Some((future, slot.waker.clone()))
    }

    /// Returns a fiber's future after a `Pending` poll.
    pub(crate) fn end_poll(&self, id: FiberId, future: FiberFuture) -> AfterPoll {
        let mut leftover = None;
        let next = {
            let mut registry = self.registry.lock();
            match registry.get_mut(id) {
                Some(slot) => {
                    slot.future = Some(future);
                    if slot.record.wake == WakeState::Notified {
                        slot.record.wake = WakeState::Scheduled;
                        AfterPoll::Requeue
                    } else {
                        slot.record.wake = WakeState::Idle;
                        slot.record.suspend();
                        AfterPoll::Parked
                    }
                }
                None => {
                    leftover = Some(future);
                    AfterPoll::Gone
                }
            }
        };
        drop(leftover);
        next
    }

    pub(crate) fn requeue(&self, id: FiberId) {
        self.schedule(id);
    }

    /// Removes a fiber whose future returned `Ready`.
    pub(crate) fn finish_fiber(&self, id: FiberId) {
        let removed = {
            let mut registry = self.registry.lock();
            let slot = registry.remove(id);
            if let Some(parent) = slot.as_ref().and_then(|s| s.record.parent) {
                if let Some(parent) = registry.get_mut(parent) {
                    parent.record.release(id);
                }
            }
            slot
        };
        trace!(fiber_id = %id, "fiber removed");
        drop(removed);
    }

    /// Completes and removes a fiber whose driver itself panicked.
    pub(crate) fn abort_fiber(&self, id: FiberId, exit: ErasedExit) {
        error!(fiber_id = %id, "fiber driver panicked");
        self.complete_fiber(id, exit);
        self.finish_fiber(id);
    }

    pub(crate) fn register_timer(&self, deadline: Time, waker: Waker) -> TimerKey {
        let (key, earliest) = self.timers.lock().insert(deadline, waker);
        if earliest {
            // Parked workers computed their timeout from a later deadline.
            self.idle.unpark_all();
        }
        key
    }

    pub(crate) fn update_timer(&self, key: TimerKey, waker: &Waker) -> bool {
        self.timers.lock().update_waker(key, waker)
    }

    pub(crate) fn cancel_timer(&self, key: TimerKey) {
        self.timers.lock().cancel(key);
    }

    /// Wakes every fiber whose timer is due. Returns how many fired.
    pub(crate) fn fire_timers(&self) -> usize {
        let now = self.now();
        let due = self.timers.lock().pop_expired(now);
        let fired = due.len();
        if fired > 0 {
            trace!(fired, now = %now, "timers fired");
        }
        for waker in due {
            waker.wake();
        }
        fired
    }

    /// How long an idle worker may park before the next timer is due.
    pub(crate) fn park_timeout(&self) -> Duration {
        let cap = self.config.park_timeout;
        let next = self.timers.lock().next_deadline();
        match next {
            Some(deadline) => deadline.saturating_duration_since(self.now()).min(cap),
            None => cap,
        }
    }

    pub(crate) fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            live_fibers: self.registry.lock().len(),
            ready_fibers: self.ready.len(),
            pending_timers: self.timers.lock().len(),
            idle_workers: self.idle.len(),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("runtime shutdown requested");
        }
        self.idle.unpark_all();
    }

    /// Drops every remaining fiber without running its teardown. Anyone
    /// still waiting on one of them gets a defect.
    ///
    /// Fiber futures hold the runtime through their `Cx`; dropping them here
    /// is what lets the state itself be freed.
    pub(crate) fn reap(&self) {
        let slots: Vec<FiberSlot> = self.registry.lock().drain();
        if !slots.is_empty() {
            debug!(abandoned = slots.len(), "dropping unfinished fibers");
        }
        while self.ready.pop().is_some() {}
        for slot in &slots {
            slot.record.done.complete(Exit::die(driver::FIBER_DROPPED));
        }
        drop(slots);
        self.timers.lock().clear();
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
