//! Fiber scheduler.
//!
//! Every worker pulls from one shared FIFO ([`ready_queue::ReadyQueue`]) and
//! gives each fiber a single quantum before moving on. Idle workers park on
//! their own [`parker::Parker`] and are woken one at a time as fibers become
//! ready.

pub mod parker;
pub mod ready_queue;
pub mod worker;

pub use parker::{IdleWorkers, Parker};
pub use ready_queue::ReadyQueue;
pub(crate) use worker::Worker;
