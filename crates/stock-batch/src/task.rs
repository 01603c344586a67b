//! Task contract, results and progress events

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-symbol unit of work executed by the engine
///
/// The engine never looks inside a task: it only calls [`run`](Self::run),
/// retries it on error and records the outcome. Implementations must be
/// cancellation safe, because tasks still running when the aggregate timeout
/// expires are dropped at their next await point. Work that blocks a thread
/// without awaiting cannot be interrupted.
///
/// Any `Fn(String) -> impl Future<Output = anyhow::Result<T>>` closure is a
/// `SymbolTask`.
#[async_trait]
pub trait SymbolTask: Send + Sync + 'static {
    /// Payload produced by a successful run
    type Output: Send + 'static;

    /// Analyze a single symbol
    async fn run(&self, symbol: &str) -> anyhow::Result<Self::Output>;
}

#[async_trait]
impl<F, Fut, T> SymbolTask for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn run(&self, symbol: &str) -> anyhow::Result<T> {
        (self)(symbol.to_string()).await
    }
}

/// Lifecycle state of a task in the progress view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success payload or failure text of a finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(String),
}

/// Final result of one task, produced exactly once per submitted symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    pub symbol: String,
    pub outcome: TaskOutcome<T>,
    /// Attempts taken, between 1 and `max_retries`
    pub attempts: u32,
    pub duration: Duration,
}

impl<T> TaskResult<T> {
    pub fn success(symbol: impl Into<String>, value: T, attempts: u32, duration: Duration) -> Self {
        Self {
            symbol: symbol.into(),
            outcome: TaskOutcome::Success(value),
            attempts,
            duration,
        }
    }

    pub fn failure(
        symbol: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            outcome: TaskOutcome::Failure(error.into()),
            attempts,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            TaskOutcome::Success(value) => Some(value),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(error) => Some(error),
        }
    }

    /// Status reported to the progress layer
    pub fn status(&self) -> TaskStatus {
        if self.is_success() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }
}

/// Status change reported by the engine
///
/// `Running` is emitted once per task, as soon as a worker picks it up and
/// before any rate limiter wait. Terminal events carry the finished result.
#[derive(Debug)]
pub struct ProgressEvent<'a, T> {
    pub symbol: &'a str,
    pub status: TaskStatus,
    pub result: Option<&'a TaskResult<T>>,
}

/// Callback receiving [`ProgressEvent`]s from worker tasks
pub type ProgressCallback<T> = Arc<dyn Fn(ProgressEvent<'_, T>) + Send + Sync>;

/// Wrap a closure as a [`ProgressCallback`]
pub fn progress_callback<T, F>(callback: F) -> ProgressCallback<T>
where
    F: Fn(ProgressEvent<'_, T>) + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_is_symbol_task() {
        let task = |symbol: String| async move { Ok::<_, anyhow::Error>(symbol.len()) };
        assert_eq!(task.run("GOOGL").await.unwrap(), 5);

        let failing = |symbol: String| async move {
            Err::<(), _>(anyhow::anyhow!("No data found for {symbol}"))
        };
        let err = failing.run("ZZZZ").await.unwrap_err();
        assert_eq!(err.to_string(), "No data found for ZZZZ");
    }

    #[test]
    fn test_task_result_accessors() {
        let ok = TaskResult::success("AAPL", 1.5, 1, Duration::from_millis(10));
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&1.5));
        assert_eq!(ok.error(), None);
        assert_eq!(ok.status(), TaskStatus::Completed);

        let failed = TaskResult::<f64>::failure("MSFT", "timeout", 3, Duration::ZERO);
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some("timeout"));
        assert_eq!(failed.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!(TaskStatus::Completed.as_str(), "completed");
        assert_eq!(
            serde_json::to_value(TaskStatus::Failed).unwrap(),
            serde_json::json!("failed")
        );
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
