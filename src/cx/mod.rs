//! Fiber capability context.
//!
//! A fiber body is a closure `FnOnce(Cx) -> impl Future`. The [`Cx`] it
//! receives is the fiber's only door into the runtime:
//!
//! ```ignore
//! use fibra::Cx;
//! use std::time::Duration;
//!
//! async fn worker(cx: Cx) -> Result<u32, String> {
//!     let child = cx.fork(|cx| async move {
//!         cx.sleep(Duration::from_millis(10)).await;
//!         Ok::<_, String>(1)
//!     });
//!     let critical = cx.uninterruptibly(async { 41 }).await;
//!     child.join().await.into_result().map(|v| v + critical).map_err(|c| c.to_string())
//! }
//! ```
//!
//! # Module Contents
//!
//! - [`Cx`]: the capability context
//! - [`Region`]: interrupt-status scope returned by `uninterruptibly` and
//!   `interruptibly`
//! - [`Checkpoint`], [`YieldNow`], [`InterruptFiber`]: the futures behind the
//!   corresponding `Cx` methods

#[allow(clippy::module_inception)]
mod cx;
mod region;

pub use cx::{Cx, InterruptFiber};
pub use region::{Checkpoint, Region, YieldNow};
