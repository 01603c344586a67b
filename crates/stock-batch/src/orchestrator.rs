//! Batch orchestration
//!
//! [`BatchAnalyzer`] picks a configuration for the batch, runs every symbol
//! through a [`ConcurrentManager`] scope, feeds a [`ProgressTracker`] and
//! folds the per-task results into a [`BatchResult`].

use crate::concurrent::ConcurrentManager;
use crate::config::{ConcurrentConfig, ConfigStrategy, secs};
use crate::error::Result;
use crate::progress::{ConsoleSink, DEFAULT_REFRESH, ProgressSink, ProgressTracker};
use crate::report::{ErrorFormatter, SummaryReport, friendly_error};
use crate::task::{
    ProgressCallback, ProgressEvent, SymbolTask, TaskOutcome, TaskResult, TaskStatus,
    progress_callback,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// How symbols are scheduled onto the worker pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Batched above [`ExecutionMode::BATCH_THRESHOLD`] symbols, concurrent otherwise
    #[default]
    Auto,
    /// Submit every symbol at once
    Concurrent,
    /// Submit symbols in sequential chunks of `batch_size`
    Batched,
}

impl ExecutionMode {
    /// Symbol count above which `Auto` switches to batched execution
    pub const BATCH_THRESHOLD: usize = 50;

    /// Whether a batch of `symbol_count` symbols runs in chunks
    pub fn is_batched(self, symbol_count: usize) -> bool {
        match self {
            Self::Auto => symbol_count > Self::BATCH_THRESHOLD,
            Self::Concurrent => false,
            Self::Batched => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Concurrent => "concurrent",
            Self::Batched => "batched",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "concurrent" => Ok(Self::Concurrent),
            "batched" | "batch" => Ok(Self::Batched),
            other => Err(format!(
                "unknown execution mode '{other}', expected auto, concurrent or batched"
            )),
        }
    }
}

/// A symbol analyzed successfully
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessfulAnalysis<T> {
    pub symbol: String,
    pub payload: T,
    pub attempts: u32,
    #[serde(with = "secs")]
    pub duration: Duration,
}

/// A symbol whose analysis failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAnalysis {
    pub symbol: String,
    pub error: String,
    pub attempts: u32,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<T> {
    pub total: usize,
    pub successes: Vec<SuccessfulAnalysis<T>>,
    pub failures: Vec<FailedAnalysis>,
    /// Wall-clock time of the batch
    #[serde(with = "secs")]
    pub duration: Duration,
    /// `successes / total` as a fraction, 0 for an empty batch
    pub success_rate: f64,
}

impl<T> BatchResult<T> {
    /// Partition task results into successes and failures
    pub fn from_results(total: usize, results: Vec<TaskResult<T>>, duration: Duration) -> Self {
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for result in results {
            match result.outcome {
                TaskOutcome::Success(payload) => successes.push(SuccessfulAnalysis {
                    symbol: result.symbol,
                    payload,
                    attempts: result.attempts,
                    duration: result.duration,
                }),
                TaskOutcome::Failure(error) => failures.push(FailedAnalysis {
                    symbol: result.symbol,
                    error,
                    attempts: result.attempts,
                }),
            }
        }

        let success_rate = if total == 0 {
            0.0
        } else {
            successes.len() as f64 / total as f64
        };

        Self {
            total,
            successes,
            failures,
            duration,
            success_rate,
        }
    }

    pub fn successful_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Summary of this batch under the given title
    pub fn summary_report(&self, title: impl Into<String>) -> SummaryReport {
        let succeeded = self.successful_count();
        SummaryReport {
            title: title.into(),
            total: self.total,
            succeeded,
            failed: self.failed_count(),
            success_rate: self.success_rate,
            elapsed: self.duration,
            failures: self
                .failures
                .iter()
                .map(|f| (f.symbol.clone(), f.error.clone()))
                .collect(),
            average_time: (succeeded > 0).then(|| self.duration.div_f64(succeeded as f64)),
        }
    }
}

/// Runs a task over many symbols and aggregates the outcome
///
/// ```rust,ignore
/// let analyzer = BatchAnalyzer::new().with_progress(false);
/// let result = analyzer.analyze(&symbols, Arc::new(fetch_quote)).await?;
/// println!("{}/{} succeeded", result.successful_count(), result.total);
/// ```
#[derive(Clone)]
pub struct BatchAnalyzer {
    strategy: ConfigStrategy,
    mode: ExecutionMode,
    show_progress: bool,
    print_summary: bool,
    refresh: Duration,
    sink: Arc<dyn ProgressSink>,
    error_formatter: Option<Arc<ErrorFormatter>>,
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchAnalyzer {
    /// Analyzer with automatic sizing, a console progress line and summary output
    pub fn new() -> Self {
        Self {
            strategy: ConfigStrategy::Auto,
            mode: ExecutionMode::Auto,
            show_progress: true,
            print_summary: true,
            refresh: DEFAULT_REFRESH,
            sink: Arc::new(ConsoleSink),
            error_formatter: Some(Arc::new(friendly_error) as Arc<ErrorFormatter>),
        }
    }

    pub fn with_strategy(mut self, strategy: ConfigStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Use a fixed configuration instead of sizing by symbol count
    pub fn with_config(self, config: ConcurrentConfig) -> Self {
        self.with_strategy(ConfigStrategy::Fixed(config))
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the live progress display
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Enable or disable printing the end-of-run summary
    pub fn with_summary(mut self, print_summary: bool) -> Self {
        self.print_summary = print_summary;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Formatter for failed tasks in the summary; `None` prints raw errors
    pub fn with_error_formatter(mut self, formatter: Option<Arc<ErrorFormatter>>) -> Self {
        self.error_formatter = formatter;
        self
    }

    pub fn strategy(&self) -> &ConfigStrategy {
        &self.strategy
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Analyze every symbol with `task`
    ///
    /// Task failures never fail the batch: they show up in
    /// [`BatchResult::failures`]. An `Err` means the engine itself could not
    /// run, for example because the configuration is invalid.
    pub async fn analyze<S>(&self, symbols: &[String], task: Arc<S>) -> Result<BatchResult<S::Output>>
    where
        S: SymbolTask,
        S::Output: Clone,
    {
        let start = Instant::now();
        let config = self.strategy.resolve(symbols.len());
        let batched = self.mode.is_batched(symbols.len());

        info!(
            symbols = symbols.len(),
            max_workers = config.max_workers,
            rate_limit = ?config.api_rate_limit,
            batched,
            "Starting batch analysis"
        );

        let mut manager = ConcurrentManager::new(config)?;

        let tracker = Arc::new(ProgressTracker::new());
        let callback = if self.show_progress {
            tracker.initialize(symbols);
            tracker.start_display(self.refresh, Arc::clone(&self.sink));
            Some(tracker_callback(&tracker))
        } else {
            None
        };

        let outcome = match manager.enter() {
            Ok(()) => {
                let outcome = if batched {
                    manager.execute_batched(symbols, task, callback).await
                } else {
                    manager.execute_concurrent(symbols, task, callback).await
                };
                manager.exit().await;
                outcome
            }
            Err(e) => Err(e),
        };
        tracker.stop_display().await;

        let result = BatchResult::from_results(symbols.len(), outcome?, start.elapsed());
        info!(
            total = result.total,
            succeeded = result.successful_count(),
            failed = result.failed_count(),
            duration = ?result.duration,
            "Batch analysis finished"
        );

        if self.print_summary {
            let formatter = self.error_formatter.as_deref();
            if self.show_progress {
                tracker.print_summary(formatter);
            } else {
                println!(
                    "{}",
                    result
                        .summary_report("📈 Multi-stock analysis complete")
                        .render(formatter)
                );
            }
        }

        Ok(result)
    }
}

impl fmt::Debug for BatchAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAnalyzer")
            .field("strategy", &self.strategy)
            .field("mode", &self.mode)
            .field("show_progress", &self.show_progress)
            .field("print_summary", &self.print_summary)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

/// Progress callback driving a tracker from engine events
fn tracker_callback<T>(tracker: &Arc<ProgressTracker<T>>) -> ProgressCallback<T>
where
    T: Clone + Send + 'static,
{
    let tracker = Arc::clone(tracker);
    progress_callback(move |event: ProgressEvent<'_, T>| match event.status {
        TaskStatus::Running => {
            tracker.start_task(event.symbol);
        }
        TaskStatus::Completed => {
            if let Some(value) = event.result.and_then(|r| r.value()) {
                tracker.complete_task(event.symbol, value.clone());
            }
        }
        TaskStatus::Failed => {
            let error = event.result.and_then(|r| r.error()).unwrap_or("unknown error");
            tracker.fail_task(event.symbol, error);
        }
        TaskStatus::Pending => {}
    })
}
