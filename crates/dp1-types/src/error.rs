use thiserror::Error;

/// Errors produced while building or validating resources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
