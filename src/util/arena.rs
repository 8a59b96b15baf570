//! Generational arena backing the fiber registry.
//!
//! Entries live in a `Vec`; freed entries are chained into a free list and
//! reused with a bumped generation, so a stale [`ArenaIndex`] never resolves
//! to a newer occupant.

use core::fmt;
use core::hash::{Hash, Hasher};

/// Position of an entry plus the generation it was allocated under.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Builds an index from raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot position.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this index was handed out.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

impl Hash for ArenaIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64((u64::from(self.index) << 32) | u64::from(self.generation));
    }
}

#[derive(Debug)]
enum Entry<T> {
    Live { generation: u32, value: T },
    Free { generation: u32, next: Option<u32> },
}

/// Vec-backed arena with generation-checked lookups.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Option<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: None,
            live: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// True when nothing is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Inserts the value built by `make`, which sees the index it will live at.
    ///
    /// Returns `None` only when the arena already holds `u32::MAX` entries.
    pub fn insert_with<F>(&mut self, make: F) -> Option<ArenaIndex>
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        let idx = match self.free {
            Some(slot) => {
                let (generation, next) = match self.entries[slot as usize] {
                    Entry::Free { generation, next } => (generation, next),
                    Entry::Live { .. } => return None,
                };
                self.free = next;
                let idx = ArenaIndex::new(slot, generation);
                self.entries[slot as usize] = Entry::Live {
                    generation,
                    value: make(idx),
                };
                idx
            }
            None => {
                let slot = u32::try_from(self.entries.len()).ok()?;
                if slot == u32::MAX {
                    return None;
                }
                let idx = ArenaIndex::new(slot, 0);
                self.entries.push(Entry::Live {
                    generation: 0,
                    value: make(idx),
                });
                idx
            }
        };
        self.live += 1;
        Some(idx)
    }

    /// Inserts a value that does not need to know its own index.
    pub fn insert(&mut self, value: T) -> Option<ArenaIndex> {
        self.insert_with(|_| value)
    }

    /// Shared access, `None` for stale or vacant indices.
    #[must_use]
    pub fn get(&self, idx: ArenaIndex) -> Option<&T> {
        match self.entries.get(idx.index as usize)? {
            Entry::Live { generation, value } if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// Exclusive access, `None` for stale or vacant indices.
    pub fn get_mut(&mut self, idx: ArenaIndex) -> Option<&mut T> {
        match self.entries.get_mut(idx.index as usize)? {
            Entry::Live { generation, value } if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// Removes and returns the entry; the slot's generation is bumped.
    pub fn remove(&mut self, idx: ArenaIndex) -> Option<T> {
        let entry = self.entries.get_mut(idx.index as usize)?;
        match entry {
            Entry::Live { generation, .. } if *generation == idx.generation => {}
            _ => return None,
        }
        let vacated = core::mem::replace(
            entry,
            Entry::Free {
                generation: idx.generation.wrapping_add(1),
                next: self.free,
            },
        );
        self.free = Some(idx.index);
        self.live -= 1;
        match vacated {
            Entry::Live { value, .. } => Some(value),
            Entry::Free { .. } => None,
        }
    }

    /// Iterates live entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Live { generation, value } => {
                    Some((ArenaIndex::new(slot as u32, *generation), value))
                }
                Entry::Free { .. } => None,
            })
    }

    /// Removes every live entry, returning them in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        let live: Vec<ArenaIndex> = self.iter().map(|(idx, _)| idx).collect();
        live.into_iter().filter_map(|idx| self.remove(idx)).collect()
    }
}
