//! Race: run two effects concurrently, first success wins.
//!
//! Both effects are forked as supervised children. The loser is always
//! interrupted and drained before the race returns:
//!
//! ```text
//! race(left, right):
//!   l ← fork(left)
//!   r ← fork(right)
//!   (first, other) ← first_to_finish(l, r)
//!   if first succeeded: interrupt(other); await(other); first
//!   else: await(other) and keep it if it succeeded,
//!         otherwise Failure(first.cause | other.cause)
//! ```
//!
//! # Algebraic Laws
//!
//! - Commutativity: `race(a, b) ≃ race(b, a)` up to which success is picked
//! - Identity: `race(a, never) ≃ a` when `a` succeeds

use super::select::{Either, Select};
use crate::cx::Cx;
use crate::runtime::FiberHandle;
use crate::tracing_compat::trace;
use crate::types::{Cause, Exit, IntoExit};
use std::fmt;
use std::future::Future;

/// Races `left` against `right`.
///
/// The first success is returned and the other fiber is interrupted and
/// awaited. When both fail the causes compose in parallel in completion
/// order.
pub async fn race<L, LFut, R, RFut, T, E>(cx: &Cx, left: L, right: R) -> Exit<T, E>
where
    L: FnOnce(Cx) -> LFut,
    LFut: Future + Send + 'static,
    LFut::Output: IntoExit<Value = T, Error = E>,
    R: FnOnce(Cx) -> RFut,
    RFut: Future + Send + 'static,
    RFut::Output: IntoExit<Value = T, Error = E>,
    T: Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    let left = cx.fork(left);
    let right = cx.fork(right);

    let first = Select::new(left.join(), right.join()).await;
    let (first, other): (Exit<T, E>, &FiberHandle<T, E>) = match first {
        Either::Left(exit) => (exit, &right),
        Either::Right(exit) => (exit, &left),
    };

    match first {
        Exit::Success(value) => {
            trace!(loser = %other.id(), "race decided, interrupting loser");
            let _loser = other.interrupt().await;
            Exit::Success(value)
        }
        Exit::Failure(first_cause) => match other.join().await {
            Exit::Success(value) => Exit::Success(value),
            Exit::Failure(other_cause) => Exit::Failure(Cause::parallel(first_cause, other_cause)),
        },
    }
}
