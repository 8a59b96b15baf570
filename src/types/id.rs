//! Identifier and timestamp types.

use crate::util::ArenaIndex;
use core::fmt;
use core::ops::Add;
use std::time::Duration;

/// Identity of a fiber.
///
/// A fiber id pairs the registry slot the fiber occupies with the instant it
/// was forked. The generation inside the slot index keeps ids unique even when
/// the registry reuses slots.
///
/// [`FiberId::NONE`] stands for "no fiber": it is the interruptor recorded
/// when an interrupt is issued from outside the runtime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId {
    index: ArenaIndex,
    born: Time,
}

impl FiberId {
    /// The absent fiber.
    pub const NONE: Self = Self {
        index: ArenaIndex::new(u32::MAX, u32::MAX),
        born: Time::ZERO,
    };

    pub(crate) const fn from_parts(index: ArenaIndex, born: Time) -> Self {
        Self { index, born }
    }

    /// Builds an id from raw parts, for tests and diagnostics.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, born_nanos: u64) -> Self {
        Self {
            index: ArenaIndex::new(slot, 0),
            born: Time::from_nanos(born_nanos),
        }
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.index
    }

    /// Instant the fiber was forked, relative to the runtime clock origin.
    #[must_use]
    pub const fn born_at(self) -> Time {
        self.born
    }

    /// True for [`FiberId::NONE`].
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("FiberId(none)");
        }
        write!(f, "FiberId({:?}@{})", self.index, self.born)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("F-")
        } else {
            write!(f, "F{}", self.index.index())
        }
    }
}

/// Nanoseconds since the runtime clock origin.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// Clock origin.
    pub const ZERO: Self = Self(0);

    /// Latest representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// From nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// From milliseconds, saturating.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// From seconds, saturating.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Nanoseconds since origin.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds since origin, truncated.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            n if n >= 1_000_000_000 => {
                write!(f, "{}.{:03}s", n / 1_000_000_000, (n / 1_000_000) % 1000)
            }
            n if n >= 1_000_000 => write!(f, "{}ms", n / 1_000_000),
            n if n >= 1_000 => write!(f, "{}us", n / 1_000),
            n => write!(f, "{n}ns"),
        }
    }
}
