//! Timer heap and runtime clock.
//!
//! Deadlines sit in a min-heap; the waker for each live timer sits in a map
//! keyed by [`TimerKey`]. Cancelling a timer only removes the map entry, and
//! the orphaned heap entry is discarded when it reaches the top.

use crate::types::Time;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::task::Waker;
use std::time::Instant;

/// Monotonic clock measuring [`Time`] from the moment the runtime started.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Clock whose origin is now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the origin.
    #[must_use]
    pub fn now(&self) -> Time {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Time::from_nanos(nanos)
    }
}

/// Identity of a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerEntry {
    deadline: Time,
    key: TimerKey,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.key.0.cmp(&self.key.0))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of deadlines with lazily cancelled entries.
#[derive(Debug, Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    wakers: HashMap<TimerKey, Waker>,
    next_key: u64,
}

impl TimerHeap {
    /// Empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (not cancelled, not fired) timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wakers.len()
    }

    /// True when no timer is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wakers.is_empty()
    }

    /// Registers a timer. The flag tells whether it became the earliest one,
    /// in which case parked workers must recompute their park timeout.
    pub fn insert(&mut self, deadline: Time, waker: Waker) -> (TimerKey, bool) {
        let key = TimerKey(self.next_key);
        self.next_key += 1;
        let earliest = self.next_deadline().map_or(true, |d| deadline < d);
        self.heap.push(TimerEntry { deadline, key });
        self.wakers.insert(key, waker);
        (key, earliest)
    }

    /// Replaces the waker of a live timer. Returns false if it already fired
    /// or was cancelled.
    pub fn update_waker(&mut self, key: TimerKey, waker: &Waker) -> bool {
        match self.wakers.get_mut(&key) {
            Some(current) => {
                if !current.will_wake(waker) {
                    current.clone_from(waker);
                }
                true
            }
            None => false,
        }
    }

    /// Cancels a timer. Unknown keys are ignored.
    pub fn cancel(&mut self, key: TimerKey) {
        self.wakers.remove(&key);
    }

    /// Earliest live deadline.
    pub fn next_deadline(&mut self) -> Option<Time> {
        while let Some(top) = self.heap.peek() {
            if self.wakers.contains_key(&top.key) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes every timer due at `now`, returning their wakers in deadline
    /// order.
    pub fn pop_expired(&mut self, now: Time) -> Vec<Waker> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let key = top.key;
            self.heap.pop();
            if let Some(waker) = self.wakers.remove(&key) {
                due.push(waker);
            }
        }
        due
    }

    /// Drops every timer.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.wakers.clear();
    }
}
