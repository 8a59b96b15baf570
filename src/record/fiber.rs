//! Fiber record: lifecycle state plus the bookkeeping the scheduler needs.
//!
//! ```text
//!             poll -> Pending                    interrupt observed
//!   Running ───────────────────► Suspended ─────────────────────┐
//!      ▲  ◄──────────────────────    │                          ▼
//!      │         woken               │                    Interrupting
//!      │                             │                          │
//!      └──── body done ──────────────┴──────────► Done ◄────────┘
//!                                            (teardown finished)
//! ```

use super::context::FiberContext;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{ErasedExit, FiberId};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Lifecycle state of a fiber.
#[derive(Debug, Clone)]
pub enum FiberState {
    /// Being polled, or queued to be.
    Running,
    /// Waiting for a waker.
    Suspended,
    /// Interrupt honoured; tearing down.
    Interrupting,
    /// Terminal.
    Done(ErasedExit),
}

impl FiberState {
    /// True for `Done`.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// True for `Interrupting`.
    #[must_use]
    pub const fn is_interrupting(&self) -> bool {
        matches!(self, Self::Interrupting)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Interrupting => "interrupting",
            Self::Done(_) => "done",
        }
    }
}

/// Scheduling state used to enqueue a fiber at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    /// Not queued, not running.
    Idle,
    /// Sitting in the ready queue.
    Scheduled,
    /// A worker is polling it.
    Running,
    /// Woken while being polled; requeue after the poll.
    Notified,
}

/// Per-fiber entry in the registry.
#[derive(Debug)]
pub struct FiberRecord {
    /// Identity.
    pub id: FiberId,
    /// Supervising parent; `None` for root and detached fibers.
    pub parent: Option<FiberId>,
    /// Lifecycle state.
    pub state: FiberState,
    /// Scheduling state.
    pub wake: WakeState,
    /// Live supervised children.
    pub children: SmallVec<[FiberId; 4]>,
    /// State shared with the fiber's own `Cx`.
    pub context: Arc<FiberContext>,
    /// Completes with the erased exit once the fiber is done.
    pub done: Arc<DoneSignal>,
    /// Number of quanta this fiber has received.
    pub polls: u64,
}

impl FiberRecord {
    /// New record in the `Running` state, already scheduled.
    #[must_use]
    pub fn new(id: FiberId, parent: Option<FiberId>) -> Self {
        Self {
            id,
            parent,
            state: FiberState::Running,
            wake: WakeState::Scheduled,
            children: SmallVec::new(),
            context: Arc::new(FiberContext::new(id)),
            done: Arc::new(DoneSignal::new()),
            polls: 0,
        }
    }

    /// Running -> Suspended. `Interrupting` is kept.
    pub fn suspend(&mut self) {
        if matches!(self.state, FiberState::Running) {
            self.state = FiberState::Suspended;
            trace!(fiber_id = %self.id, "fiber suspended");
        }
    }

    /// Suspended -> Running. `Interrupting` is kept.
    pub fn resume(&mut self) {
        if matches!(self.state, FiberState::Suspended) {
            self.state = FiberState::Running;
            trace!(fiber_id = %self.id, "fiber resumed");
        }
    }

    /// Enters `Interrupting`. Returns false when already done.
    pub fn begin_interrupting(&mut self) -> bool {
        match self.state {
            FiberState::Done(_) => {
                warn!(fiber_id = %self.id, "interrupting a fiber that is already done");
                false
            }
            FiberState::Interrupting => true,
            _ => {
                debug!(fiber_id = %self.id, from = self.state.name(), "fiber interrupting");
                self.state = FiberState::Interrupting;
                true
            }
        }
    }

    /// Enters `Done`. Returns false, leaving the state alone, when already done.
    pub fn complete(&mut self, exit: ErasedExit) -> bool {
        if self.state.is_done() {
            warn!(fiber_id = %self.id, "fiber completed twice");
            return false;
        }
        debug!(
            fiber_id = %self.id,
            from = self.state.name(),
            success = exit.is_success(),
            polls = self.polls,
            "fiber done"
        );
        self.state = FiberState::Done(exit);
        true
    }

    /// Records a child to supervise.
    pub fn adopt(&mut self, child: FiberId) {
        self.children.push(child);
    }

    /// Forgets a child that has finished.
    pub fn release(&mut self, child: FiberId) {
        self.children.retain(|c| *c != child);
    }
}

/// Completion latch holding a fiber's erased exit.
///
/// Any number of waiters can await it; each receives a clone of the exit.
#[derive(Debug, Default)]
pub struct DoneSignal {
    inner: Mutex<DoneInner>,
}

#[derive(Debug, Default)]
struct DoneInner {
    exit: Option<ErasedExit>,
    waiters: SmallVec<[Waker; 2]>,
}

impl DoneSignal {
    /// Open latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the latch and wakes every waiter. Later calls are ignored.
    pub fn complete(&self, exit: ErasedExit) {
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.exit.is_some() {
                return;
            }
            inner.exit = Some(exit);
            std::mem::take(&mut inner.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    /// The exit, once known.
    #[must_use]
    pub fn get(&self) -> Option<ErasedExit> {
        self.inner.lock().exit.clone()
    }

    /// Polls for the exit, registering `cx`'s waker while it is unknown.
    pub fn poll_exit(&self, cx: &mut Context<'_>) -> Poll<ErasedExit> {
        let mut inner = self.inner.lock();
        if let Some(exit) = &inner.exit {
            return Poll::Ready(exit.clone());
        }
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            inner.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }

    /// Future resolving to the exit.
    #[must_use]
    pub fn wait(self: &Arc<Self>) -> DoneWait {
        DoneWait {
            signal: Arc::clone(self),
        }
    }
}

/// Future returned by [`DoneSignal::wait`].
#[derive(Debug)]
pub struct DoneWait {
    signal: Arc<DoneSignal>,
}

impl Future for DoneWait {
    type Output = ErasedExit;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<ErasedExit> {
        self.signal.poll_exit(cx)
    }
}
