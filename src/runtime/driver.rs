//! Fiber driver: the future the scheduler actually polls.
//!
//! Wraps a fiber's body with interrupt checks at every poll boundary and with
//! panic capture, then runs the teardown sequence:
//!
//! 1. body completes, panics, or is dropped because an interrupt was honoured
//! 2. supervised children still alive are interrupted and awaited
//! 3. finalizers left on the fiber's stack run, last registered first
//! 4. the fiber becomes `Done` and its exit is published

use super::fiber_handle::JoinCell;
use crate::cx::Cx;
use crate::record::{DoneWait, FiberContext};
use crate::tracing_compat::{debug, warn};
use crate::types::{Cause, Defect, ErasedExit, Exit, FiberId, IntoExit};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Runs a fiber body to its final exit and publishes it.
///
/// The joiners' guard is armed before the first poll, so dropping the
/// returned future at any point still releases them.
pub(crate) fn drive<Fut, T, E>(
    cx: Cx,
    body: Fut,
    cell: Arc<JoinCell<T, E>>,
) -> impl Future<Output = ()>
where
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    E: fmt::Debug,
{
    let publish = Publish { cell };
    async move {
        let primary = Guarded::new(Arc::clone(cx.context()), body).await;
        let exit = teardown(&cx, primary).await;
        cx.runtime().complete_fiber(cx.id(), exit.erase());
        publish.cell.complete(exit);
    }
}

/// Releases joiners with a defect if the driver is dropped before it
/// published an exit (runtime shutdown, driver panic).
struct Publish<T, E> {
    cell: Arc<JoinCell<T, E>>,
}

impl<T, E> Drop for Publish<T, E> {
    fn drop(&mut self) {
        if !self.cell.is_finished() {
            self.cell.complete(Exit::die(FIBER_DROPPED));
        }
    }
}

/// Defect seen by joiners of a fiber that was dropped unfinished.
pub(crate) const FIBER_DROPPED: &str = "fiber dropped before completion";

/// The body, checked for interrupts before and after every poll.
struct Guarded<Fut> {
    ctx: Arc<FiberContext>,
    body: Option<Pin<Box<Fut>>>,
}

impl<Fut> Guarded<Fut> {
    fn new(ctx: Arc<FiberContext>, body: Fut) -> Self {
        Self {
            ctx,
            body: Some(Box::pin(body)),
        }
    }

    fn abandon<T, E>(&mut self, by: FiberId) -> Exit<T, E> {
        debug!(fiber_id = %self.ctx.id(), by = %by, "interrupt honoured");
        // Dropping the body unwinds its scopes: regions restore the status
        // stack, sleeps cancel their timers. Sealing first leaves finalizer
        // scopes to teardown.
        self.ctx.seal();
        self.body = None;
        Exit::interrupt(by)
    }
}

impl<Fut> Future for Guarded<Fut>
where
    Fut: Future,
    Fut::Output: IntoExit,
{
    type Output = Exit<<Fut::Output as IntoExit>::Value, <Fut::Output as IntoExit>::Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Some(by) = this.ctx.interrupt_now() {
            return Poll::Ready(this.abandon(by));
        }
        let Some(body) = this.body.as_mut() else {
            return Poll::Ready(Exit::die("fiber body polled after completion"));
        };
        match catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(cx))) {
            Ok(Poll::Ready(output)) => {
                this.body = None;
                Poll::Ready(output.into_exit())
            }
            Ok(Poll::Pending) => match this.ctx.interrupt_now() {
                Some(by) => Poll::Ready(this.abandon(by)),
                None => Poll::Pending,
            },
            Err(payload) => {
                this.ctx.seal();
                this.body = None;
                let defect = Defect::from_panic(payload.as_ref());
                warn!(fiber_id = %this.ctx.id(), message = defect.message(), "fiber panicked");
                Poll::Ready(Exit::Failure(Cause::die(defect)))
            }
        }
    }
}

async fn teardown<T, E>(cx: &Cx, primary: Exit<T, E>) -> Exit<T, E> {
    let id = cx.id();
    let runtime = cx.runtime();
    let ctx = cx.context();
    ctx.seal();
    if primary.is_interrupted() {
        runtime.mark_interrupting(id);
    }

    let mut exit = primary;
    let children = runtime.take_children(id);
    if !children.is_empty() {
        debug!(fiber_id = %id, children = children.len(), "interrupting children");
        let waits = children
            .into_iter()
            .filter_map(|child| runtime.interrupt(child, id))
            .map(|done| done.wait())
            .collect();
        let children_cause = CompletionOrder::new(waits).await;
        if exit.is_failure() {
            exit = exit.then_cause(children_cause.widen());
        } else if !children_cause.is_empty() {
            debug!(fiber_id = %id, cause = %children_cause, "child causes discarded");
        }
    }

    while let Some(finalizer) = ctx.pop_finalizer() {
        if let Err(defect) = finalizer.run().await {
            warn!(fiber_id = %id, message = defect.message(), "finalizer failed");
            exit = exit.then_cause(Cause::die(defect));
        }
    }
    exit
}

/// Awaits several exits, composing their causes in parallel in the order
/// they complete.
struct CompletionOrder {
    pending: Vec<Option<DoneWait>>,
    cause: Cause<Infallible>,
}

impl CompletionOrder {
    fn new(pending: Vec<DoneWait>) -> Self {
        Self {
            pending: pending.into_iter().map(Some).collect(),
            cause: Cause::empty(),
        }
    }
}

impl Future for CompletionOrder {
    type Output = Cause<Infallible>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut outstanding = 0;
        for slot in &mut this.pending {
            let Some(wait) = slot.as_mut() else {
                continue;
            };
            match Pin::new(wait).poll(cx) {
                Poll::Ready(exit) => {
                    *slot = None;
                    if let ErasedExit::Failure(cause) = exit {
                        let acc = std::mem::replace(&mut this.cause, Cause::empty());
                        this.cause = Cause::parallel(acc, cause);
                    }
                }
                Poll::Pending => outstanding += 1,
            }
        }
        if outstanding == 0 {
            Poll::Ready(std::mem::replace(&mut this.cause, Cause::empty()))
        } else {
            Poll::Pending
        }
    }
}
