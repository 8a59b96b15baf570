//! Wakers.
//!
//! A fiber's waker holds only its id and a weak reference to the runtime;
//! waking goes through [`RuntimeState::wake`], which de-duplicates against the
//! fiber's wake state. One waker is built per fiber and reused for every poll,
//! so `will_wake` comparisons downstream stay cheap.

use super::state::RuntimeState;
use crate::types::FiberId;
use std::sync::{Arc, Weak};
use std::task::{Wake, Waker};
use std::thread::Thread;

struct FiberWaker {
    id: FiberId,
    runtime: Weak<RuntimeState>,
}

impl Wake for FiberWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.wake(self.id);
        }
    }
}

/// Waker scheduling `id` on the runtime behind `runtime`.
pub(crate) fn fiber_waker(runtime: Weak<RuntimeState>, id: FiberId) -> Waker {
    Waker::from(Arc::new(FiberWaker { id, runtime }))
}

struct ThreadWaker {
    thread: Thread,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.thread.unpark();
    }
}

/// Waker that unparks the current OS thread. Used to block outside fibers.
pub(crate) fn thread_waker() -> Waker {
    Waker::from(Arc::new(ThreadWaker {
        thread: std::thread::current(),
    }))
}
