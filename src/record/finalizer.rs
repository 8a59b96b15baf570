//! Finalizers owned by a fiber.
//!
//! A finalizer is cleanup registered by `ensuring` or `acquire_release`. It
//! runs exactly once: inline when its scope completes normally, or during
//! teardown when the scope was abandoned (interruption, panic). Teardown runs
//! whatever is left in LIFO order.

use crate::types::Defect;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Cleanup action.
pub enum Finalizer {
    /// Runs to completion synchronously.
    Sync(Box<dyn FnOnce() + Send>),
    /// Polled to completion on the owning fiber.
    Async(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl std::fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Finalizer::Sync(..)"),
            Self::Async(_) => f.write_str("Finalizer::Async(..)"),
        }
    }
}

impl Finalizer {
    /// Runs the finalizer, turning a panic into a [`Defect`].
    pub async fn run(self) -> Result<(), Defect> {
        match self {
            Self::Sync(f) => catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| Defect::from_panic(payload.as_ref())),
            Self::Async(fut) => CatchUnwind { fut }.await,
        }
    }
}

struct CatchUnwind {
    fut: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Future for CatchUnwind {
    type Output = Result<(), Defect>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let fut = self.fut.as_mut();
        match catch_unwind(AssertUnwindSafe(|| fut.poll(cx))) {
            Ok(Poll::Ready(())) => Poll::Ready(Ok(())),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(Defect::from_panic(payload.as_ref()))),
        }
    }
}

/// Handle to a registered finalizer, used to take it back out when its scope
/// completes normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizerKey(u64);

/// LIFO stack of pending finalizers.
#[derive(Debug, Default)]
pub struct FinalizerStack {
    entries: Vec<(FinalizerKey, Finalizer)>,
    next_key: u64,
}

impl FinalizerStack {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a finalizer on top of the stack.
    pub fn push(&mut self, finalizer: Finalizer) -> FinalizerKey {
        let key = FinalizerKey(self.next_key);
        self.next_key += 1;
        self.entries.push((key, finalizer));
        key
    }

    /// Registers a synchronous closure.
    pub fn push_sync<F>(&mut self, f: F) -> FinalizerKey
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Finalizer::Sync(Box::new(f)))
    }

    /// Registers a future.
    pub fn push_async<F>(&mut self, future: F) -> FinalizerKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.push(Finalizer::Async(Box::pin(future)))
    }

    /// Takes a specific finalizer back out, wherever it sits.
    pub fn take(&mut self, key: FinalizerKey) -> Option<Finalizer> {
        let pos = self.entries.iter().rposition(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Pops the most recently registered finalizer.
    pub fn pop(&mut self) -> Option<Finalizer> {
        self.entries.pop().map(|(_, f)| f)
    }

    /// Number of pending finalizers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
