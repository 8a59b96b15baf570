//! Runtime records: fibers, their shared context and their finalizers.

pub mod context;
pub mod fiber;
pub mod finalizer;

pub use context::{FiberContext, InterruptDisposition};
pub use fiber::{DoneSignal, DoneWait, FiberRecord, FiberState, WakeState};
pub use finalizer::{Finalizer, FinalizerKey, FinalizerStack};
