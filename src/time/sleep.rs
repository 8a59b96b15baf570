//! Sleep future.

use crate::runtime::state::RuntimeState;
use crate::runtime::timer::TimerKey;
use crate::types::Time;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Completes once the runtime clock reaches a deadline.
///
/// Created by [`Cx::sleep`](crate::cx::Cx::sleep) and
/// [`Cx::sleep_until`](crate::cx::Cx::sleep_until). The timer is registered
/// on first poll and cancelled when the future is dropped, so an interrupted
/// sleep leaves nothing behind in the timer heap.
pub struct Sleep {
    runtime: Arc<RuntimeState>,
    deadline: Time,
    timer: Option<TimerKey>,
}

impl Sleep {
    pub(crate) fn new(runtime: Arc<RuntimeState>, deadline: Time) -> Self {
        Self {
            runtime,
            deadline,
            timer: None,
        }
    }

    /// When this sleep completes.
    #[must_use]
    pub fn deadline(&self) -> Time {
        self.deadline
    }

    /// True once the deadline has passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.runtime.now() >= self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_elapsed() {
            if let Some(key) = self.timer.take() {
                self.runtime.cancel_timer(key);
            }
            return Poll::Ready(());
        }
        let registered = match self.timer {
            Some(key) => self.runtime.update_timer(key, cx.waker()),
            None => false,
        };
        if !registered {
            let key = self.runtime.register_timer(self.deadline, cx.waker().clone());
            self.timer = Some(key);
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(key) = self.timer.take() {
            self.runtime.cancel_timer(key);
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.timer.is_some())
            .finish()
    }
}
