//! Error types for batch execution

use thiserror::Error;

/// Fatal errors raised by the batch engine
///
/// Individual task failures are never reported through this type: they are
/// captured as failed [`TaskResult`](crate::task::TaskResult)s so that a batch
/// always completes. Only structural misuse and invalid configuration surface
/// here.
#[derive(Debug, Error)]
pub enum BatchError {
    /// An execution method was called before `enter()` or after `exit()`
    #[error("ConcurrentManager must be entered before executing tasks")]
    ScopeRequired,

    /// `enter()` was called on a manager that already owns a worker pool
    #[error("ConcurrentManager is already entered")]
    AlreadyEntered,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;
