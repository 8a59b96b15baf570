//! Fibra: cooperative fibers with scoped interruption and a cause algebra.
//!
//! # Overview
//!
//! A fiber is a lightweight thread of execution multiplexed over a small
//! worker pool (or the calling thread). Every fiber terminates with an
//! [`Exit`]: a value, or a [`Cause`] describing everything that went wrong,
//! sequentially or concurrently.
//!
//! # Core Guarantees
//!
//! - **Interrupts are signals**: a request is recorded and honoured only at
//!   poll boundaries, never in the middle of an uninterruptible region
//! - **Supervision**: a fiber that terminates interrupts and awaits its
//!   still-running children
//! - **Finalizers run once**: scoped cleanup registered through `ensuring`
//!   or `acquire_release` runs on every exit path, interruption included
//! - **Nothing is lost**: finalizer and child failures compose into the
//!   cause instead of replacing it
//!
//! # Module Structure
//!
//! - [`types`]: ids, time, the cause algebra, exits and interrupt statuses
//! - [`record`]: per-fiber records, contexts and finalizers
//! - [`runtime`]: builder, scheduler, registry, timers
//! - [`cx`]: the capability context handed to every fiber
//! - [`combinator`]: select, timeout and race
//! - [`time`]: sleeping
//! - [`error`]: runtime errors and [`FiberFailure`]
//! - [`util`]: the generational arena
//!
//! # Example
//!
//! ```ignore
//! use fibra::{combinator::timeout, RuntimeBuilder};
//! use std::time::Duration;
//!
//! let runtime = RuntimeBuilder::current_thread().build()?;
//! let answer = runtime.run(|cx| async move {
//!     timeout(&cx, Duration::from_millis(100), |cx| async move {
//!         cx.sleep(Duration::from_millis(10)).await;
//!         Ok::<_, String>(42)
//!     })
//!     .await
//! })?;
//! assert_eq!(answer, Some(42));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod combinator;
pub mod cx;
pub mod error;
pub mod record;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use cx::Cx;
pub use error::{Error, ErrorKind, FiberFailure, Result};
pub use runtime::{FiberHandle, Runtime, RuntimeBuilder, RuntimeConfig, RuntimeHandle};
pub use types::{Cause, Defect, ErasedExit, Exit, FiberId, InterruptStatus, IntoExit, Time};
