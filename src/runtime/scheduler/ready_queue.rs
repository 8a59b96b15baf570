//! Shared FIFO of fibers ready to run.

use crate::types::FiberId;
use crossbeam_queue::SegQueue;

/// Lock-free FIFO shared by every worker.
///
/// Fibers are pushed on fork and on wake, and re-pushed at the tail when they
/// wake themselves during a poll. FIFO order gives round-robin scheduling.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    inner: SegQueue<FiberId>,
}

impl ReadyQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Appends at the tail.
    pub fn push(&self, fiber: FiberId) {
        self.inner.push(fiber);
    }

    /// Takes from the head.
    pub fn pop(&self) -> Option<FiberId> {
        self.inner.pop()
    }

    /// Queued fibers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
