//! How a fiber ended.

use super::cause::{Cause, Defect};
use super::id::FiberId;
use core::convert::Infallible;
use core::fmt;

/// Terminal result of a fiber: a value, or the [`Cause`] of its failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit<T, E> {
    /// Completed with a value.
    Success(T),
    /// Terminated abnormally.
    Failure(Cause<E>),
}

/// An exit with both the value and the error type erased.
///
/// The runtime keeps one of these per fiber; typed exits are only available
/// through the fiber's handle.
pub type ErasedExit = Exit<(), Infallible>;

impl<T, E> Exit<T, E> {
    /// Successful exit.
    #[must_use]
    pub const fn succeed(value: T) -> Self {
        Self::Success(value)
    }

    /// Failed with a typed error.
    #[must_use]
    pub const fn fail(error: E) -> Self {
        Self::Failure(Cause::Fail(error))
    }

    /// Failed with a defect.
    #[must_use]
    pub fn die(message: impl Into<String>) -> Self {
        Self::Failure(Cause::Die(Defect::new(message)))
    }

    /// Interrupted by `by`.
    #[must_use]
    pub const fn interrupt(by: FiberId) -> Self {
        Self::Failure(Cause::Interrupt(by))
    }

    /// True for `Success`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// True for `Failure`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// True when the failure cause contains an interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Failure(cause) if cause.is_interrupted())
    }

    /// The success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    /// The failure cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause<E>> {
        match self {
            Self::Success(_) => None,
            Self::Failure(c) => Some(c),
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Exit<U, E> {
        match self {
            Self::Success(v) => Exit::Success(f(v)),
            Self::Failure(c) => Exit::Failure(c),
        }
    }

    /// Maps every typed failure in the cause.
    pub fn map_err<E2>(self, f: impl FnMut(E) -> E2) -> Exit<T, E2> {
        match self {
            Self::Success(v) => Exit::Success(v),
            Self::Failure(c) => Exit::Failure(c.map(f)),
        }
    }

    /// Converts to a `Result` keeping the whole cause on failure.
    pub fn into_result(self) -> Result<T, Cause<E>> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failure(c) => Err(c),
        }
    }

    /// Recovers from a typed failure.
    ///
    /// `handler` runs only when the cause consists of typed failures alone;
    /// it receives the first one. Defects and interruptions pass through.
    pub fn catch_fail(self, handler: impl FnOnce(E) -> Self) -> Self {
        match self {
            Self::Failure(cause) => match cause.failure_or_cause() {
                Ok(e) => handler(e),
                Err(cause) => Self::Failure(cause),
            },
            success => success,
        }
    }

    /// Recovers from any failure, seeing the full cause.
    pub fn catch_cause(self, handler: impl FnOnce(Cause<E>) -> Self) -> Self {
        match self {
            Self::Failure(cause) => handler(cause),
            success => success,
        }
    }

    /// Composes `cause` after this exit: the exit becomes a failure whose
    /// cause is `previous ; cause`. An empty `cause` leaves it untouched.
    #[must_use]
    pub fn then_cause(self, cause: Cause<E>) -> Self {
        if cause.is_empty() {
            return self;
        }
        match self {
            Self::Success(_) => Self::Failure(cause),
            Self::Failure(prev) => Self::Failure(Cause::sequential(prev, cause)),
        }
    }

    /// Combines two exits of concurrently run fibers.
    ///
    /// Both successes are zipped with `f`. Failures are kept; when both
    /// failed their causes compose in parallel, `self` first.
    pub fn combine_parallel<U, V>(self, other: Exit<U, E>, f: impl FnOnce(T, U) -> V) -> Exit<V, E> {
        match (self, other) {
            (Self::Success(a), Exit::Success(b)) => Exit::Success(f(a, b)),
            (Self::Failure(c), Exit::Success(_)) | (Self::Success(_), Exit::Failure(c)) => {
                Exit::Failure(c)
            }
            (Self::Failure(a), Exit::Failure(b)) => Exit::Failure(Cause::parallel(a, b)),
        }
    }

    /// Erased view kept by the runtime.
    #[must_use]
    pub fn erase(&self) -> ErasedExit
    where
        E: fmt::Debug,
    {
        match self {
            Self::Success(_) => Exit::Success(()),
            Self::Failure(c) => Exit::Failure(c.erase()),
        }
    }

    /// Returns the success value.
    ///
    /// # Panics
    ///
    /// Panics with the rendered cause on failure.
    #[track_caller]
    pub fn unwrap(self) -> T
    where
        E: fmt::Debug,
    {
        match self {
            Self::Success(v) => v,
            Self::Failure(c) => panic!("called `Exit::unwrap()` on a failure: {c}"),
        }
    }
}

impl<T, E> From<Result<T, E>> for Exit<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Success(v),
            Err(e) => Self::fail(e),
        }
    }
}

/// Outputs a fiber body may produce.
///
/// Fiber bodies return either a plain `Result` or a full [`Exit`]; both are
/// normalised through this trait.
pub trait IntoExit {
    /// Success type.
    type Value;
    /// Typed error.
    type Error;

    /// Converts into an exit.
    fn into_exit(self) -> Exit<Self::Value, Self::Error>;
}

impl<T, E> IntoExit for Result<T, E> {
    type Value = T;
    type Error = E;

    fn into_exit(self) -> Exit<T, E> {
        self.into()
    }
}

impl<T, E> IntoExit for Exit<T, E> {
    type Value = T;
    type Error = E;

    fn into_exit(self) -> Self {
        self
    }
}
