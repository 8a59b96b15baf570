//! The fiber capability context.
//!
//! Every fiber body receives a [`Cx`]. It is the only way to reach the
//! runtime from inside a fiber: forking, interrupting, sleeping, scoping the
//! interrupt status and registering finalizers all go through it.

use super::region::{Checkpoint, Region, YieldNow};
use crate::record::{DoneSignal, FiberContext, Finalizer, FinalizerKey};
use crate::runtime::fiber_handle::FiberHandle;
use crate::runtime::spawn_blocking::{self, BlockingTask};
use crate::runtime::state::{Link, RuntimeState};
use crate::runtime::RuntimeHandle;
use crate::time::Sleep;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{Cause, Defect, ErasedExit, Exit, FiberId, InterruptStatus, IntoExit, Time};
use std::convert::Infallible;
use std::fmt;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Capability context of one fiber.
///
/// Cheap to clone; clones refer to the same fiber. A `Cx` moved into another
/// fiber still describes the fiber it was created for.
#[derive(Clone)]
pub struct Cx {
    ctx: Arc<FiberContext>,
    runtime: Arc<RuntimeState>,
}

impl Cx {
    pub(crate) fn new(ctx: Arc<FiberContext>, runtime: Arc<RuntimeState>) -> Self {
        Self { ctx, runtime }
    }

    pub(crate) fn context(&self) -> &Arc<FiberContext> {
        &self.ctx
    }

    pub(crate) fn runtime(&self) -> &Arc<RuntimeState> {
        &self.runtime
    }

    /// This fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.ctx.id()
    }

    /// Runtime clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.runtime.now()
    }

    /// Current interrupt status.
    #[must_use]
    pub fn interrupt_status(&self) -> InterruptStatus {
        self.ctx.status()
    }

    /// The interruptor, if an interrupt has been requested and not yet
    /// honoured (it may be queued behind an uninterruptible region).
    #[must_use]
    pub fn pending_interrupt(&self) -> Option<FiberId> {
        self.ctx.pending_interrupt()
    }

    /// Handle to the runtime this fiber runs on.
    #[must_use]
    pub fn runtime_handle(&self) -> RuntimeHandle {
        RuntimeHandle::from_state(&self.runtime)
    }

    /// Forks a supervised child.
    ///
    /// When this fiber terminates, the child is interrupted and awaited if it
    /// is still running.
    pub fn fork<F, Fut, T, E>(&self, effect: F) -> FiberHandle<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        self.runtime.fork(Link::Child(self.id()), effect)
    }

    /// Forks a fiber this one does not supervise. It outlives its forker.
    pub fn fork_detached<F, Fut, T, E>(&self, effect: F) -> FiberHandle<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        self.runtime.fork(Link::Detached(self.id()), effect)
    }

    /// Interrupts `target` and waits for its erased exit.
    ///
    /// The request is sent when the returned future is first polled. It
    /// resolves to `None` when no such fiber is live. Interrupting oneself
    /// takes effect at once if the status allows it; while uninterruptible it
    /// is queued and the future resolves to `None` immediately.
    pub fn interrupt(&self, target: FiberId) -> InterruptFiber {
        InterruptFiber {
            cx: self.clone(),
            target,
            state: InterruptState::Unsent,
        }
    }

    /// Runs `body` with interrupts queued until it completes.
    pub fn uninterruptibly<F: Future>(&self, body: F) -> Region<F> {
        Region::new(Arc::clone(&self.ctx), InterruptStatus::Uninterruptible, body)
    }

    /// Runs `body` interruptibly, typically nested in an uninterruptible
    /// region.
    pub fn interruptibly<F: Future>(&self, body: F) -> Region<F> {
        Region::new(Arc::clone(&self.ctx), InterruptStatus::Interruptible, body)
    }

    /// Interruption point for long computations.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(Arc::clone(&self.ctx))
    }

    /// Lets other ready fibers run.
    #[must_use]
    pub fn yield_now(&self) -> YieldNow {
        YieldNow::new()
    }

    /// Suspends the fiber for `duration`.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(self.now() + duration)
    }

    /// Suspends the fiber until the runtime clock reaches `deadline`.
    #[must_use]
    pub fn sleep_until(&self, deadline: Time) -> Sleep {
        Sleep::new(Arc::clone(&self.runtime), deadline)
    }

    /// Runs `f` on a dedicated thread, suspending only this fiber.
    ///
    /// If the fiber is interrupted meanwhile, the thread still runs `f` to
    /// completion and the result is dropped.
    pub fn spawn_blocking<F, R>(&self, f: F) -> BlockingTask<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        spawn_blocking::spawn_blocking(self.runtime.config(), f)
    }

    /// Runs `effect` in a detached fiber and awaits it.
    ///
    /// If this fiber is interrupted while waiting, the detached fiber is sent
    /// an interrupt but not awaited: it finishes, finalizers included, in the
    /// background.
    pub async fn disconnect<F, Fut, T, E>(&self, effect: F) -> Exit<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: IntoExit<Value = T, Error = E>,
        T: Send + 'static,
        E: fmt::Debug + Send + 'static,
    {
        let handle = self.fork_detached(effect);
        let mut guard = InterruptOnDrop {
            handle: &handle,
            armed: true,
        };
        let exit = handle.join().await;
        guard.armed = false;
        exit
    }

    /// Runs `effect`, then `finalizer`, whatever way `effect` ends.
    ///
    /// On normal completion the finalizer runs inline, uninterruptibly. If
    /// the fiber abandons the effect (interruption, panic) the fiber's
    /// teardown runs it instead. If only the scope is dropped, say as the
    /// losing side of a [`Select`](crate::combinator::Select), the finalizer
    /// runs at once in a detached uninterruptible fiber. A panicking
    /// finalizer adds a defect after the effect's cause.
    pub async fn ensuring<Fut, Fin, FinFut>(
        &self,
        effect: Fut,
        finalizer: Fin,
    ) -> Exit<<Fut::Output as IntoExit>::Value, <Fut::Output as IntoExit>::Error>
    where
        Fut: Future,
        Fut::Output: IntoExit,
        Fin: FnOnce() -> FinFut + Send + 'static,
        FinFut: Future<Output = ()> + Send + 'static,
    {
        let key = self
            .ctx
            .push_finalizer(Finalizer::Async(Box::pin(async move { finalizer().await })));
        let scope = FinalizerScope::new(self, key);
        let exit = effect.await.into_exit();
        scope.finish(exit).await
    }

    /// Acquires a resource, uses it and releases it.
    ///
    /// `acquire` runs uninterruptibly and the release is registered in the
    /// same region, so an interrupt can never fall between the two. The
    /// release runs exactly once: after `use_` completes, during teardown
    /// if the fiber is interrupted or panics while using the resource, or
    /// in a detached fiber if the scope itself is dropped.
    pub async fn acquire_release<A, R, U, UFut, Rel, RelFut, T, E>(
        &self,
        acquire: A,
        use_: U,
        release: Rel,
    ) -> Exit<T, E>
    where
        A: Future,
        A::Output: IntoExit<Value = R, Error = E>,
        R: Clone + Send + 'static,
        U: FnOnce(R) -> UFut,
        UFut: Future,
        UFut::Output: IntoExit<Value = T, Error = E>,
        Rel: FnOnce(R) -> RelFut + Send + 'static,
        RelFut: Future<Output = ()> + Send + 'static,
    {
        let acquired = self
            .uninterruptibly(async {
                acquire.await.into_exit().map(|resource| {
                    let held = resource.clone();
                    let key = self.ctx.push_finalizer(Finalizer::Async(Box::pin(async move {
                        release(held).await;
                    })));
                    (resource, key)
                })
            })
            .await;
        let (resource, key) = match acquired {
            Exit::Success(acquired) => acquired,
            Exit::Failure(cause) => return Exit::Failure(cause),
        };
        let scope = FinalizerScope::new(self, key);
        let exit = use_(resource).await.into_exit();
        scope.finish(exit).await
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("id", &self.id())
            .field("status", &self.interrupt_status())
            .field("pending_interrupt", &self.pending_interrupt())
            .finish()
    }
}

type Release = Pin<Box<dyn Future<Output = Result<(), Defect>> + Send>>;

/// Owns one registered finalizer for the lifetime of its scope.
///
/// Whichever way the scope ends, the finalizer runs once. A scope dropped
/// while its fiber carries on hands the finalizer, or what is left of it, to
/// a detached fiber. A scope dropped because the fiber abandons its body
/// leaves a registered finalizer on the stack for teardown.
struct FinalizerScope<'a> {
    cx: &'a Cx,
    state: ScopeState,
}

enum ScopeState {
    Registered(FinalizerKey),
    Running(Release),
    Finished,
}

impl<'a> FinalizerScope<'a> {
    fn new(cx: &'a Cx, key: FinalizerKey) -> Self {
        Self {
            cx,
            state: ScopeState::Registered(key),
        }
    }

    async fn finish<T, E>(mut self, exit: Exit<T, E>) -> Exit<T, E> {
        let ScopeState::Registered(key) = std::mem::replace(&mut self.state, ScopeState::Finished)
        else {
            return exit;
        };
        let Some(finalizer) = self.cx.ctx.take_finalizer(key) else {
            return exit;
        };
        self.state = ScopeState::Running(Box::pin(finalizer.run()));
        let state = &mut self.state;
        let result = self
            .cx
            .uninterruptibly(poll_fn(|task| match state {
                ScopeState::Running(release) => release.as_mut().poll(task),
                ScopeState::Registered(_) | ScopeState::Finished => Poll::Ready(Ok(())),
            }))
            .await;
        self.state = ScopeState::Finished;
        match result {
            Ok(()) => exit,
            Err(defect) => {
                warn!(fiber_id = %self.cx.id(), message = defect.message(), "finalizer failed");
                exit.then_cause(Cause::die(defect))
            }
        }
    }
}

impl Drop for FinalizerScope<'_> {
    fn drop(&mut self) {
        if self.cx.runtime.is_shutdown() {
            return;
        }
        let release = match std::mem::replace(&mut self.state, ScopeState::Finished) {
            ScopeState::Finished => return,
            ScopeState::Registered(_) if self.cx.ctx.is_sealed() => return,
            ScopeState::Registered(key) => match self.cx.ctx.take_finalizer(key) {
                Some(finalizer) => Box::pin(finalizer.run()),
                None => return,
            },
            ScopeState::Running(release) => release,
        };
        debug!(fiber_id = %self.cx.id(), "finalizer scope dropped, releasing in background");
        let _release = self.cx.fork_detached(move |cx| async move {
            if let Err(defect) = cx.uninterruptibly(release).await {
                warn!(fiber_id = %cx.id(), message = defect.message(), "finalizer failed");
            }
            Ok::<(), Infallible>(())
        });
    }
}

struct InterruptOnDrop<'a, T, E> {
    handle: &'a FiberHandle<T, E>,
    armed: bool,
}

impl<T, E> Drop for InterruptOnDrop<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            trace!(fiber_id = %self.handle.id(), "disconnected fiber left running");
            self.handle.interrupt_fork();
        }
    }
}

enum InterruptState {
    Unsent,
    Waiting(Arc<DoneSignal>),
    Done,
}

/// Future returned by [`Cx::interrupt`].
pub struct InterruptFiber {
    cx: Cx,
    target: FiberId,
    state: InterruptState,
}

impl Future for InterruptFiber {
    type Output = Option<ErasedExit>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ErasedExit>> {
        let this = &mut *self;
        let me = this.cx.id();
        if let InterruptState::Unsent = this.state {
            match this.cx.runtime.interrupt(this.target, me) {
                Some(signal) if this.target != me => this.state = InterruptState::Waiting(signal),
                Some(_) => this.state = InterruptState::Done,
                None => {
                    this.state = InterruptState::Done;
                    return Poll::Ready(None);
                }
            }
        }
        match &this.state {
            InterruptState::Waiting(signal) => match signal.poll_exit(cx) {
                Poll::Ready(exit) => {
                    this.state = InterruptState::Done;
                    Poll::Ready(Some(exit))
                }
                Poll::Pending => Poll::Pending,
            },
            // Self-interrupt: the driver acts on it at the poll boundary.
            InterruptState::Done if this.cx.context().interrupt_now().is_some() => Poll::Pending,
            InterruptState::Done | InterruptState::Unsent => Poll::Ready(None),
        }
    }
}

impl fmt::Debug for InterruptFiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            InterruptState::Unsent => "unsent",
            InterruptState::Waiting(_) => "waiting",
            InterruptState::Done => "done",
        };
        f.debug_struct("InterruptFiber")
            .field("target", &self.target)
            .field("state", &state)
            .finish()
    }
}
