//! Timers as seen from fibers.
//!
//! Deadlines are [`Time`](crate::types::Time) values on the runtime clock,
//! which starts at zero when the runtime is built.

mod sleep;

pub use sleep::Sleep;
