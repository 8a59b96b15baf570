//! Runtime: registry, scheduler, timers and the fiber driver.
//!
//! - [`config`]: runtime configuration and its defaults
//! - [`env_config`]: `FIBRA_*` environment overrides
//! - [`builder`]: [`RuntimeBuilder`], [`Runtime`] and [`RuntimeHandle`]
//! - [`scheduler`]: the shared ready queue, worker loop and idle parking
//! - [`registry`]: the arena of live fibers
//! - [`timer`]: the runtime clock and the timer heap
//! - [`fiber_handle`]: typed handles to forked fibers
//!
//! # Runtime Builder
//!
//! The builder is move-based: each method consumes `self` and returns the
//! updated builder.
//!
//! ```ignore
//! use fibra::runtime::RuntimeBuilder;
//!
//! let runtime = RuntimeBuilder::multi_thread().build()?;
//! let answer = runtime.run(|cx| async move {
//!     let child = cx.fork(|_cx| async { Ok::<_, ()>(41) });
//!     child.join().await.map(|v| v + 1)
//! })?;
//! ```
//!
//! With `RuntimeBuilder::current_thread()` no thread is spawned; fibers
//! advance only while `run` or `run_exit` is executing on the caller.
//!
//! # Environment Overrides
//!
//! ```ignore
//! let runtime = RuntimeBuilder::new().with_env_overrides()?.build()?;
//! ```
//!
//! See [`env_config`] for the recognised variables.

pub mod builder;
pub mod config;
pub(crate) mod driver;
pub mod env_config;
pub mod fiber_handle;
pub mod registry;
pub mod scheduler;
pub(crate) mod spawn_blocking;
pub(crate) mod state;
pub mod timer;
pub(crate) mod waker;

pub use builder::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use config::RuntimeConfig;
pub use fiber_handle::{FiberHandle, Join, EXIT_ALREADY_TAKEN};
pub use spawn_blocking::BlockingTask;
pub use state::RuntimeSnapshot;
