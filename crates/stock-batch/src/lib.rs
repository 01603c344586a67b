//! Concurrent multi-symbol analysis engine
//!
//! This crate runs one asynchronous task per stock symbol with bounded
//! parallelism and aggregates the outcome. It includes:
//!
//! - A bounded worker pool with an aggregate timeout (`ConcurrentManager`)
//! - A shared minimum-interval rate limiter built on `governor` (`RateLimiter`)
//! - Linear backoff retries (`RetryPolicy`)
//! - A thread-safe progress state machine with a live display (`ProgressTracker`)
//! - Configuration tiers sized by symbol count (`ConcurrentConfig`)
//! - A batch orchestrator tying everything together (`BatchAnalyzer`)
//!
//! # Architecture
//!
//! `BatchAnalyzer::analyze` resolves a configuration, enters a
//! `ConcurrentManager` scope and submits every symbol. Each worker waits for a
//! pool permit, then for the rate limiter before every attempt. Status changes
//! flow to the `ProgressTracker` through a progress callback, and the final
//! `TaskResult`s are folded into a `BatchResult`.
//!
//! Task failures never abort a batch. They are recorded as failed results with
//! their error text and attempt count.
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_batch::BatchAnalyzer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
//!
//!     let task = Arc::new(|symbol: String| async move {
//!         // fetch and analyze the symbol
//!         Ok::<_, anyhow::Error>(symbol.len())
//!     });
//!
//!     let result = BatchAnalyzer::new().analyze(&symbols, task).await?;
//!     println!("{} of {} succeeded", result.successful_count(), result.total);
//!
//!     Ok(())
//! }
//! ```

pub mod concurrent;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod task;

// Re-export main types for convenience
pub use concurrent::ConcurrentManager;
pub use config::{ConcurrentConfig, ConcurrentConfigBuilder, ConfigStrategy, Tier};
pub use error::{BatchError, Result};
pub use orchestrator::{
    BatchAnalyzer, BatchResult, ExecutionMode, FailedAnalysis, SuccessfulAnalysis,
};
pub use progress::{
    AnalysisTask, ConsoleSink, NullSink, ProgressSink, ProgressStats, ProgressTracker,
};
pub use rate_limiter::RateLimiter;
pub use report::{ErrorCategory, ErrorFormatter, SummaryReport, friendly_error};
pub use retry::{RetryOutcome, RetryPolicy};
pub use task::{
    ProgressCallback, ProgressEvent, SymbolTask, TaskOutcome, TaskResult, TaskStatus,
    progress_callback,
};
