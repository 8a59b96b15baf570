//! Select: wait for the first of two futures to complete.
//!
//! # Loser Responsibility
//!
//! `Select` picks the winner and leaves the loser with the caller. Dropping
//! a loser that is a fiber join does not stop the fiber; the fiber
//! combinators built on `Select` interrupt and drain it explicitly:
//!
//! ```text
//! match Select::new(left.join(), right.join()).await {
//!     Either::Left(exit)  => { interrupt(right); await(right); exit }
//!     Either::Right(exit) => { interrupt(left); await(left); exit }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Result of a select operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    /// The first future completed first.
    Left(A),
    /// The second future completed first.
    Right(B),
}

impl<A, B> Either<A, B> {
    /// Returns true if this is the Left variant.
    pub fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    /// Returns true if this is the Right variant.
    pub fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }
}

/// Future for the select combinator.
///
/// Both futures are polled on every wakeup, left first, so a left future
/// that is ready wins a tie.
#[derive(Debug)]
pub struct Select<A, B> {
    a: A,
    b: B,
}

impl<A, B> Select<A, B> {
    /// Creates a new select combinator.
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }

    /// Gives back both futures, for instance to await the loser after a
    /// completed select.
    pub fn into_inner(self) -> (A, B) {
        (self.a, self.b)
    }
}

impl<A: Future + Unpin, B: Future + Unpin> Future for Select<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(val) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Either::Left(val));
        }

        if let Poll::Ready(val) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Either::Right(val));
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready, Pending, Ready};
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct Noop;

    impl Wake for Noop {
        fn wake(self: Arc<Self>) {}
    }

    fn poll<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn left_wins_ties() {
        let mut sel = Select::new(ready(1), ready("b"));
        assert_eq!(poll(&mut sel), Poll::Ready(Either::Left(1)));
    }

    #[test]
    fn right_wins_when_left_pends() {
        let mut sel: Select<Pending<u8>, Ready<u8>> = Select::new(pending(), ready(2));
        let out = poll(&mut sel);
        assert_eq!(out, Poll::Ready(Either::Right(2)));
        assert!(matches!(out, Poll::Ready(e) if e.is_right() && !e.is_left()));
    }

    #[test]
    fn both_pending_is_pending() {
        let mut sel = Select::new(pending::<()>(), pending::<()>());
        assert!(poll(&mut sel).is_pending());
        let (_a, _b) = sel.into_inner();
    }
}
