//! Per-fiber state shared between the fiber's own `Cx` and the runtime.
//!
//! Holds the interrupt-status stack, the pending interrupt (if any) and the
//! finalizer stack. Lock order: the registry lock may be held while taking
//! this lock, never the other way round.

use super::finalizer::{Finalizer, FinalizerKey, FinalizerStack};
use crate::types::{FiberId, InterruptStack, InterruptStatus};
use parking_lot::Mutex;

/// What happened to an interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptDisposition {
    /// Recorded while interruptible; the fiber should be woken.
    Deliver,
    /// Recorded while uninterruptible; honoured when the status is restored.
    Queued,
    /// An earlier interrupt is already pending. The request is idempotent.
    AlreadyPending,
}

#[derive(Debug, Default)]
struct InterruptState {
    stack: InterruptStack,
    pending: Option<FiberId>,
    sealed: bool,
}

/// Shared per-fiber context.
#[derive(Debug)]
pub struct FiberContext {
    id: FiberId,
    interrupt: Mutex<InterruptState>,
    finalizers: Mutex<FinalizerStack>,
}

impl FiberContext {
    /// Fresh context: interruptible, nothing pending, no finalizers.
    #[must_use]
    pub fn new(id: FiberId) -> Self {
        Self {
            id,
            interrupt: Mutex::new(InterruptState::default()),
            finalizers: Mutex::new(FinalizerStack::new()),
        }
    }

    /// Owning fiber.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Records an interrupt request. The first interruptor wins.
    pub fn request_interrupt(&self, by: FiberId) -> InterruptDisposition {
        let mut state = self.interrupt.lock();
        if state.pending.is_some() {
            return InterruptDisposition::AlreadyPending;
        }
        state.pending = Some(by);
        if !state.sealed && state.stack.current().is_interruptible() {
            InterruptDisposition::Deliver
        } else {
            InterruptDisposition::Queued
        }
    }

    /// The interruptor, if an interrupt is pending and may be honoured now.
    #[must_use]
    pub fn interrupt_now(&self) -> Option<FiberId> {
        let state = self.interrupt.lock();
        if state.sealed || !state.stack.current().is_interruptible() {
            return None;
        }
        state.pending
    }

    /// The pending interruptor regardless of status.
    #[must_use]
    pub fn pending_interrupt(&self) -> Option<FiberId> {
        self.interrupt.lock().pending
    }

    /// Status in effect. Sealed contexts report uninterruptible.
    #[must_use]
    pub fn status(&self) -> InterruptStatus {
        let state = self.interrupt.lock();
        if state.sealed {
            InterruptStatus::Uninterruptible
        } else {
            state.stack.current()
        }
    }

    /// Enters a region with `status`; returns the depth to restore.
    pub fn push_status(&self, status: InterruptStatus) -> usize {
        self.interrupt.lock().stack.push(status)
    }

    /// Leaves a region entered at `depth`.
    pub fn restore_status(&self, depth: usize) {
        self.interrupt.lock().stack.restore(depth);
    }

    /// Makes the fiber permanently uninterruptible. Used for teardown.
    pub fn seal(&self) {
        self.interrupt.lock().sealed = true;
    }

    /// True once teardown has started or the body is being abandoned.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.interrupt.lock().sealed
    }

    /// Registers a finalizer.
    pub fn push_finalizer(&self, finalizer: Finalizer) -> FinalizerKey {
        self.finalizers.lock().push(finalizer)
    }

    /// Takes a specific finalizer back.
    pub fn take_finalizer(&self, key: FinalizerKey) -> Option<Finalizer> {
        self.finalizers.lock().take(key)
    }

    /// Pops the most recent finalizer.
    pub fn pop_finalizer(&self) -> Option<Finalizer> {
        self.finalizers.lock().pop()
    }

    /// Number of pending finalizers.
    #[must_use]
    pub fn finalizer_count(&self) -> usize {
        self.finalizers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FiberContext {
        FiberContext::new(FiberId::new_for_test(1, 0))
    }

    #[test]
    fn interruptible_request_is_delivered() {
        let ctx = ctx();
        let by = FiberId::new_for_test(2, 0);
        assert_eq!(ctx.request_interrupt(by), InterruptDisposition::Deliver);
        assert_eq!(ctx.interrupt_now(), Some(by));
    }

    #[test]
    fn uninterruptible_request_is_queued_then_honoured() {
        let ctx = ctx();
        let depth = ctx.push_status(InterruptStatus::Uninterruptible);
        assert_eq!(
            ctx.request_interrupt(FiberId::NONE),
            InterruptDisposition::Queued
        );
        assert_eq!(ctx.interrupt_now(), None);
        assert_eq!(ctx.pending_interrupt(), Some(FiberId::NONE));
        ctx.restore_status(depth);
        assert_eq!(ctx.interrupt_now(), Some(FiberId::NONE));
    }

    #[test]
    fn first_interruptor_wins() {
        let ctx = ctx();
        let first = FiberId::new_for_test(5, 0);
        ctx.request_interrupt(first);
        assert_eq!(
            ctx.request_interrupt(FiberId::new_for_test(6, 0)),
            InterruptDisposition::AlreadyPending
        );
        assert_eq!(ctx.pending_interrupt(), Some(first));
    }

    #[test]
    fn sealed_context_never_interrupts() {
        let ctx = ctx();
        ctx.seal();
        assert_eq!(ctx.status(), InterruptStatus::Uninterruptible);
        assert_eq!(
            ctx.request_interrupt(FiberId::NONE),
            InterruptDisposition::Queued
        );
        assert_eq!(ctx.interrupt_now(), None);
    }

    #[test]
    fn finalizers_round_trip_through_context() {
        let ctx = ctx();
        let key = ctx.push_finalizer(Finalizer::Sync(Box::new(|| {})));
        ctx.push_finalizer(Finalizer::Sync(Box::new(|| {})));
        assert_eq!(ctx.finalizer_count(), 2);
        assert!(ctx.take_finalizer(key).is_some());
        assert!(ctx.pop_finalizer().is_some());
        assert!(ctx.pop_finalizer().is_none());
    }
}
