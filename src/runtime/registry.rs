//! Registry of live fibers.
//!
//! Owns every fiber's record and its type-erased future. Fibers refer to each
//! other by [`FiberId`] only; ids are resolved here, with the arena generation
//! and the birth time both checked so a stale id never aliases a new fiber.

use crate::record::FiberRecord;
use crate::types::{FiberId, Time};
use crate::util::Arena;
use std::future::Future;
use std::pin::Pin;
use std::task::Waker;

/// Type-erased fiber future.
pub type FiberFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Registry entry.
pub struct FiberSlot {
    /// Lifecycle and supervision state.
    pub record: FiberRecord,
    /// `None` while a worker is polling it, or before it is installed.
    pub future: Option<FiberFuture>,
    /// Waker handed to every poll of this fiber.
    pub waker: Waker,
}

impl std::fmt::Debug for FiberSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberSlot")
            .field("record", &self.record)
            .field("future", &self.future.is_some())
            .finish_non_exhaustive()
    }
}

/// Arena of fiber slots.
#[derive(Debug, Default)]
pub struct Registry {
    fibers: Arena<FiberSlot>,
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slot for a new fiber. The future is installed later.
    ///
    /// Returns `None` when the registry is full.
    pub fn reserve(
        &mut self,
        born: Time,
        parent: Option<FiberId>,
        waker_for: impl FnOnce(FiberId) -> Waker,
    ) -> Option<FiberId> {
        let idx = self.fibers.insert_with(|idx| {
            let id = FiberId::from_parts(idx, born);
            FiberSlot {
                record: FiberRecord::new(id, parent),
                future: None,
                waker: waker_for(id),
            }
        })?;
        Some(FiberId::from_parts(idx, born))
    }

    /// Shared access.
    #[must_use]
    pub fn get(&self, id: FiberId) -> Option<&FiberSlot> {
        self.fibers
            .get(id.arena_index())
            .filter(|slot| slot.record.id == id)
    }

    /// Exclusive access.
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut FiberSlot> {
        self.fibers
            .get_mut(id.arena_index())
            .filter(|slot| slot.record.id == id)
    }

    /// Removes a fiber.
    pub fn remove(&mut self, id: FiberId) -> Option<FiberSlot> {
        self.get(id)?;
        self.fibers.remove(id.arena_index())
    }

    /// Live fibers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    /// True when no fiber is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Removes every fiber. The caller drops the slots after releasing the
    /// registry lock, since dropping a fiber future may call back into the
    /// runtime.
    pub fn drain(&mut self) -> Vec<FiberSlot> {
        self.fibers.drain()
    }
}
