//! Errors raised while assembling a runtime configuration.

use thiserror::Error;

/// Configuration rejected by a builder or by environment parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A field holds a value outside its domain.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Free-form validation failure.
    #[error("{0}")]
    Custom(String),
}

impl BuildError {
    /// `field` holds an unusable value.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Free-form message.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Result alias for builder operations.
pub type BuildResult<T> = Result<T, BuildError>;
