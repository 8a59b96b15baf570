//! Interrupt-status regions and explicit interruption points.

use crate::record::FiberContext;
use crate::types::InterruptStatus;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Runs a future with the fiber's interrupt status overridden.
///
/// The status is pushed when the region is first polled and restored when
/// the inner future completes or the region is dropped. If an interrupt is
/// pending and the restored status allows it, the region never yields its
/// output: the fiber is interrupted before any code after the region runs.
pub struct Region<F: Future> {
    ctx: Arc<FiberContext>,
    status: InterruptStatus,
    inner: Option<Pin<Box<F>>>,
    depth: Option<usize>,
    held: Option<F::Output>,
}

impl<F: Future> Region<F> {
    pub(crate) fn new(ctx: Arc<FiberContext>, status: InterruptStatus, inner: F) -> Self {
        Self {
            ctx,
            status,
            inner: Some(Box::pin(inner)),
            depth: None,
            held: None,
        }
    }

    fn restore(&mut self) {
        if let Some(depth) = self.depth.take() {
            self.ctx.restore_status(depth);
        }
    }
}

// `inner` is boxed and `held` is never pinned.
impl<F: Future> Unpin for Region<F> {}

impl<F: Future> Future for Region<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = &mut *self;
        if this.held.is_some() {
            if this.ctx.interrupt_now().is_some() {
                return Poll::Pending;
            }
            if let Some(output) = this.held.take() {
                return Poll::Ready(output);
            }
        }
        let Some(inner) = this.inner.as_mut() else {
            panic!("`Region` polled after completion");
        };
        if this.depth.is_none() {
            this.depth = Some(this.ctx.push_status(this.status));
        }
        match inner.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => {
                this.inner = None;
                this.restore();
                if this.ctx.interrupt_now().is_some() {
                    // Hold the value; the fiber driver drops this future at
                    // the poll boundary and honours the interrupt.
                    this.held = Some(output);
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    Poll::Ready(output)
                }
            }
        }
    }
}

impl<F: Future> Drop for Region<F> {
    fn drop(&mut self) {
        // The inner future goes first: its own nested regions restore to
        // depths above ours.
        self.inner = None;
        self.restore();
    }
}

impl<F: Future> fmt::Debug for Region<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("status", &self.status)
            .field("active", &self.depth.is_some())
            .field("done", &self.inner.is_none())
            .finish()
    }
}

/// Explicit interruption point. Pends forever once an interrupt can be
/// honoured, which lets the fiber driver drop the body; otherwise ready.
#[derive(Debug)]
pub struct Checkpoint {
    ctx: Arc<FiberContext>,
}

impl Checkpoint {
    pub(crate) fn new(ctx: Arc<FiberContext>) -> Self {
        Self { ctx }
    }
}

impl Future for Checkpoint {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.ctx.interrupt_now().is_some() {
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

/// Gives up the rest of the quantum once. The fiber goes to the back of the
/// ready queue.
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
