//! Handles to forked fibers.

use super::state::RuntimeState;
use crate::record::{DoneSignal, DoneWait};
use crate::tracing_compat::trace;
use crate::types::{Exit, FiberId};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

/// Message of the defect returned when a fiber's exit is taken twice.
pub const EXIT_ALREADY_TAKEN: &str = "fiber exit already taken";

/// Single-consumer slot for a fiber's typed exit.
pub(crate) struct JoinCell<T, E> {
    inner: Mutex<JoinSlot<T, E>>,
}

struct JoinSlot<T, E> {
    exit: Option<Exit<T, E>>,
    finished: bool,
    waiters: SmallVec<[Waker; 2]>,
}

impl<T, E> JoinCell<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(JoinSlot {
                exit: None,
                finished: false,
                waiters: SmallVec::new(),
            }),
        }
    }

    /// Stores the exit and wakes every joiner. Later calls are ignored.
    pub(crate) fn complete(&self, exit: Exit<T, E>) {
        let waiters = {
            let mut slot = self.inner.lock();
            if slot.finished {
                return;
            }
            slot.finished = true;
            slot.exit = Some(exit);
            std::mem::take(&mut slot.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// Takes the exit if the fiber is done.
    pub(crate) fn try_take(&self) -> Option<Exit<T, E>> {
        let mut slot = self.inner.lock();
        if !slot.finished {
            return None;
        }
        Some(slot.exit.take().unwrap_or_else(|| Exit::die(EXIT_ALREADY_TAKEN)))
    }

    fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Exit<T, E>> {
        let mut slot = self.inner.lock();
        if slot.finished {
            return Poll::Ready(
                slot.exit
                    .take()
                    .unwrap_or_else(|| Exit::die(EXIT_ALREADY_TAKEN)),
            );
        }
        if !slot.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            slot.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Handle to a forked fiber.
///
/// Dropping the handle does not affect the fiber. The typed exit can be
/// taken once, through [`join`](Self::join) or [`interrupt`](Self::interrupt);
/// later attempts yield a defect.
pub struct FiberHandle<T, E> {
    id: FiberId,
    owner: FiberId,
    cell: Arc<JoinCell<T, E>>,
    done: Arc<DoneSignal>,
    runtime: Weak<RuntimeState>,
}

impl<T, E> FiberHandle<T, E> {
    pub(crate) fn new(
        id: FiberId,
        owner: FiberId,
        cell: Arc<JoinCell<T, E>>,
        done: Arc<DoneSignal>,
        runtime: Weak<RuntimeState>,
    ) -> Self {
        Self {
            id,
            owner,
            cell,
            done,
            runtime,
        }
    }

    /// Handle for a fiber that could not be created. It is already finished
    /// with a defect carrying `message`.
    pub(crate) fn rejected(owner: FiberId, message: &str) -> Self {
        let cell = Arc::new(JoinCell::new());
        cell.complete(Exit::die(message));
        let done = Arc::new(DoneSignal::new());
        done.complete(Exit::die(message));
        Self::new(FiberId::NONE, owner, cell, done, Weak::new())
    }

    /// The fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// True once the fiber is done.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cell.is_finished()
    }

    /// Waits for the fiber's exit.
    #[must_use]
    pub fn join(&self) -> Join<'_, T, E> {
        Join { cell: &self.cell }
    }

    /// Takes the exit without waiting, if the fiber is done.
    pub fn try_join(&self) -> Option<Exit<T, E>> {
        self.cell.try_take()
    }

    /// Waits for the erased exit. Unlike `join`, any number of callers get it.
    #[must_use]
    pub fn await_done(&self) -> DoneWait {
        self.done.wait()
    }

    /// Interrupts the fiber and waits for it to finish.
    ///
    /// The request is sent immediately, with the fiber that forked this one
    /// as interruptor. If the target is inside an uninterruptible region the
    /// returned future resolves only after the region and the teardown ran.
    pub fn interrupt(&self) -> Join<'_, T, E> {
        self.interrupt_fork();
        self.join()
    }

    /// Sends an interrupt without waiting.
    pub fn interrupt_fork(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.interrupt(self.id, self.owner);
        } else {
            trace!(fiber_id = %self.id, "interrupt after runtime shutdown ignored");
        }
    }
}

impl<T, E> fmt::Debug for FiberHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberHandle")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Future returned by [`FiberHandle::join`].
pub struct Join<'a, T, E> {
    cell: &'a JoinCell<T, E>,
}

impl<T, E> Future for Join<'_, T, E> {
    type Output = Exit<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Exit<T, E>> {
        self.cell.poll_take(cx)
    }
}

impl<T, E> fmt::Debug for Join<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Join { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Wake;

    struct Noop;

    impl Wake for Noop {
        fn wake(self: Arc<Self>) {}
    }

    fn handle(cell: &Arc<JoinCell<u32, &'static str>>) -> FiberHandle<u32, &'static str> {
        FiberHandle::new(
            FiberId::new_for_test(1, 0),
            FiberId::NONE,
            Arc::clone(cell),
            Arc::new(DoneSignal::new()),
            Weak::new(),
        )
    }

    #[test]
    fn join_waits_for_completion() {
        let cell = Arc::new(JoinCell::new());
        let handle = handle(&cell);
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);

        let mut join = handle.join();
        assert!(Pin::new(&mut join).poll(&mut cx).is_pending());
        assert!(!handle.is_finished());

        cell.complete(Exit::Success(9));
        assert!(handle.is_finished());
        assert_eq!(Pin::new(&mut join).poll(&mut cx), Poll::Ready(Exit::Success(9)));
    }

    #[test]
    fn second_take_is_a_defect() {
        let cell = Arc::new(JoinCell::new());
        let handle = handle(&cell);
        cell.complete(Exit::Success(1));
        assert_eq!(handle.try_join(), Some(Exit::Success(1)));
        let again = handle.try_join().unwrap();
        assert_eq!(
            again.cause().map(|c| c.defects()[0].message().to_string()),
            Some(EXIT_ALREADY_TAKEN.to_string())
        );
    }

    #[test]
    fn rejected_handles_are_finished() {
        let handle: FiberHandle<u8, ()> = FiberHandle::rejected(FiberId::NONE, "no room");
        assert!(handle.is_finished());
        assert!(handle.id().is_none());
        let exit = handle.try_join().unwrap();
        assert_eq!(exit.cause().unwrap().defects()[0].message(), "no room");
    }

    #[test]
    fn interrupt_without_runtime_is_harmless() {
        let cell = Arc::new(JoinCell::new());
        let handle = handle(&cell);
        handle.interrupt_fork();
        assert!(handle.try_join().is_none());
        assert!(format!("{handle:?}").contains("finished: false"));
    }
}
