//! Logging facade.
//!
//! With the `tracing-integration` feature the macros below are the ones from
//! the `tracing` crate. Without it they expand to nothing, so diagnostics cost
//! nothing in builds that do not want them.
//!
//! ```rust,ignore
//! use fibra::tracing_compat::{debug, debug_span};
//!
//! debug!(fiber_id = %id, "fiber forked");
//! let _span = debug_span!("fiber_poll", fiber_id = %id).entered();
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, debug_span, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// No-op `trace!`.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op `debug!`.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op `info!`.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op `warn!`.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op `error!`.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    /// No-op `debug_span!`, evaluating to a [`NoopSpan`](super::NoopSpan).
    #[macro_export]
    macro_rules! debug_span {
        ($($arg:tt)*) => {
            $crate::tracing_compat::NoopSpan
        };
    }

    pub use crate::{debug, debug_span, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

/// Span stand-in used when tracing is compiled out.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug, Clone, Copy)]
pub struct NoopSpan;

#[cfg(not(feature = "tracing-integration"))]
impl NoopSpan {
    /// Mirrors `tracing::Span::entered`.
    #[must_use]
    pub fn entered(self) -> NoopEntered {
        NoopEntered
    }
}

/// Guard returned by [`NoopSpan::entered`].
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug)]
pub struct NoopEntered;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_accept_structured_fields() {
        let fiber = 3;
        trace!(fiber_id = fiber, "trace");
        debug!(fiber_id = fiber, "debug");
        info!("info");
        warn!(reason = "x", "warn");
        error!("error {}", fiber);
        let _guard = debug_span!("poll", fiber_id = fiber).entered();
    }
}
