//! Combinators over fibers.
//!
//! - [`select`]: wait for the first of two futures
//! - [`timeout`]: bound an effect by a duration
//! - [`race`]: run two effects, first success wins
//!
//! Every combinator that forks drains what it forks: a loser or a timed-out
//! effect has terminated by the time the combinator returns.

pub mod race;
pub mod select;
pub mod timeout;

pub use race::race;
pub use select::{Either, Select};
pub use timeout::{timeout, timeout_fail, timeout_fail_cause, timeout_to};
