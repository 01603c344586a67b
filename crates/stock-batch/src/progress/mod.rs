//! Progress tracking and live display
//!
//! - [`ProgressTracker`]: per-task state machine with consistent counters
//! - [`ProgressStats`]: immutable snapshot of those counters
//! - [`ProgressSink`]: where a running display renders snapshots

pub mod display;
pub mod stats;
pub mod tracker;

pub use display::{
    BAR_WIDTH, ConsoleSink, DEFAULT_REFRESH, NullSink, ProgressSink, format_duration,
    progress_bar, status_line,
};
pub use stats::{AnalysisTask, ProgressStats};
pub use tracker::ProgressTracker;
