//! Shared utilities for stock-batch
//!
//! This crate provides the ambient pieces used by the stock-batch binaries:
//! tracing setup and application configuration read from the environment.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LogFormat};
pub use error::{Result, UtilsError};
pub use logging::{init_tracing, init_tracing_with};
