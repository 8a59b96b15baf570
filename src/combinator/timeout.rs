//! Timeout combinators: bound an effect by a duration.
//!
//! The effect runs as a supervised child of the calling fiber and is raced
//! against a sleep. When the sleep wins, the child is interrupted and
//! drained before the combinator returns:
//!
//! ```text
//! timeout(d, effect):
//!   child ← fork(effect)
//!   match first_of(join(child), sleep(d)):
//!     child done  → its exit
//!     deadline    → interrupt(child); await(child); None
//! ```
//!
//! Draining means an uninterruptible effect holds the combinator until it
//! finishes, even past the deadline. Wrap the effect in
//! [`Cx::disconnect`] to return at the deadline and let it finish in the
//! background.
//!
//! # Algebraic Law
//!
//! ```text
//! timeout(d1, timeout(d2, f)) ≃ timeout(min(d1, d2), f)
//! ```

use super::select::{Either, Select};
use crate::cx::Cx;
use crate::tracing_compat::debug;
use crate::types::{Cause, Exit, IntoExit};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Runs `effect` in a child fiber for at most `duration`.
///
/// `Some(exit)` when the child finished first, `None` when the deadline
/// passed; in that case the child has been interrupted and has terminated.
async fn within<F, Fut, T, E>(cx: &Cx, duration: Duration, effect: F) -> Option<Exit<T, E>>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    let child = cx.fork(effect);
    let first = Select::new(child.join(), cx.sleep(duration)).await;
    match first {
        Either::Left(exit) => Some(exit),
        Either::Right(()) => {
            debug!(fiber_id = %child.id(), ?duration, "deadline passed, interrupting effect");
            let discarded = child.interrupt().await;
            debug!(
                fiber_id = %child.id(),
                interrupted = discarded.is_interrupted(),
                "timed-out effect drained"
            );
            None
        }
    }
}

/// Runs `effect` with a deadline, mapping the outcome.
///
/// `on_success` maps the value if the effect succeeded in time; a failure of
/// the effect is returned as is. `on_timeout` supplies the value when the
/// deadline passed first.
pub async fn timeout_to<F, Fut, T, E, B>(
    cx: &Cx,
    duration: Duration,
    effect: F,
    on_success: impl FnOnce(T) -> B,
    on_timeout: impl FnOnce() -> B,
) -> Exit<B, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    match within(cx, duration, effect).await {
        Some(exit) => exit.map(on_success),
        None => Exit::Success(on_timeout()),
    }
}

/// Runs `effect` with a deadline. `Success(None)` means it timed out.
pub async fn timeout<F, Fut, T, E>(cx: &Cx, duration: Duration, effect: F) -> Exit<Option<T>, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    timeout_to(cx, duration, effect, Some, || None).await
}

/// Runs `effect` with a deadline; timing out is a typed failure built by
/// `on_timeout`.
pub async fn timeout_fail<F, Fut, T, E>(
    cx: &Cx,
    duration: Duration,
    effect: F,
    on_timeout: impl FnOnce() -> E,
) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    timeout_fail_cause(cx, duration, effect, || Cause::fail(on_timeout())).await
}

/// Runs `effect` with a deadline; timing out fails with the cause built by
/// `on_timeout`.
pub async fn timeout_fail_cause<F, Fut, T, E>(
    cx: &Cx,
    duration: Duration,
    effect: F,
    on_timeout: impl FnOnce() -> Cause<E>,
) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    match within(cx, duration, effect).await {
        Some(exit) => exit,
        None => Exit::Failure(on_timeout()),
    }
}
