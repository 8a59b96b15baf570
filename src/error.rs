//! Runtime errors.
//!
//! Two families live here:
//!
//! - [`Error`]: failures of the runtime itself (bad configuration, worker
//!   threads that could not be spawned, use after shutdown). These are
//!   ordinary Rust errors with a kind, an optional message and a source chain.
//! - [`FiberFailure`]: the error produced by [`Runtime::run`] when the main
//!   fiber did not succeed. It carries the full [`Cause`].
//!
//! Failures of fibers are never reported through [`Error`]; they are values
//! ([`Exit`](crate::types::Exit), [`Cause`]).
//!
//! [`Runtime::run`]: crate::runtime::Runtime::run

use crate::types::{BuildError, Cause};
use core::fmt;
use std::sync::Arc;

/// The kind of runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration was rejected.
    InvalidConfig,
    /// A worker thread could not be started.
    ThreadSpawn,
    /// The runtime has shut down.
    RuntimeShutdown,
    /// Internal invariant broken (runtime bug).
    Internal,
}

/// Runtime error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Error of the given kind with no message.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attaches a source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Worker thread spawn failure.
    #[must_use]
    pub fn thread_spawn(name: &str, source: std::io::Error) -> Self {
        Self::new(ErrorKind::ThreadSpawn)
            .with_message(format!("failed to spawn worker thread `{name}`"))
            .with_source(source)
    }

    /// Runtime bug.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Self::new(ErrorKind::InvalidConfig)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main fiber of [`Runtime::run`](crate::runtime::Runtime::run) did not
/// succeed.
///
/// The cause is kept whole, so callers can still tell a typed failure from a
/// defect or an interruption.
#[derive(Clone, PartialEq, Eq)]
pub struct FiberFailure<E> {
    cause: Cause<E>,
}

impl<E> FiberFailure<E> {
    /// Wraps a cause.
    #[must_use]
    pub fn new(cause: Cause<E>) -> Self {
        Self { cause }
    }

    /// The cause.
    #[must_use]
    pub fn cause(&self) -> &Cause<E> {
        &self.cause
    }

    /// Consumes the error, returning the cause.
    #[must_use]
    pub fn into_cause(self) -> Cause<E> {
        self.cause
    }
}

impl<E: fmt::Debug> fmt::Debug for FiberFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FiberFailure").field(&self.cause).finish()
    }
}

impl<E: fmt::Debug> fmt::Display for FiberFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber failed: {}", self.cause)
    }
}

impl<E: fmt::Debug> std::error::Error for FiberFailure<E> {}
