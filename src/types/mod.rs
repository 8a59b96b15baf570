//! Core value types.
//!
//! - [`id`]: `FiberId` and `Time`
//! - [`cause`]: the cause algebra (`Cause`, `Defect`)
//! - [`exit`]: fiber exits (`Exit`, `ErasedExit`, `IntoExit`)
//! - [`interrupt`]: interrupt statuses and the per-fiber status stack
//! - [`builder`]: configuration errors

pub mod builder;
pub mod cause;
pub mod exit;
pub mod id;
pub mod interrupt;

pub use builder::{BuildError, BuildResult};
pub use cause::{Cause, Defect};
pub use exit::{ErasedExit, Exit, IntoExit};
pub use id::{FiberId, Time};
pub use interrupt::{InterruptStack, InterruptStatus};
