//! Error types for the shared utilities

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UtilsError {
    /// An environment variable holds an unusable value
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    /// The log filter directive could not be parsed
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// A global tracing subscriber was already installed
    #[error("Tracing already initialized: {0}")]
    TracingInit(String),
}

pub type Result<T> = std::result::Result<T, UtilsError>;
