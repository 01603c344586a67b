//! Bounded worker pool executing symbol tasks
//!
//! A [`ConcurrentManager`] is a scoped resource: [`enter`](ConcurrentManager::enter)
//! creates its worker pool, the execution methods submit work to it and
//! [`exit`](ConcurrentManager::exit) releases it. Dropping an entered manager
//! aborts everything it still owns.
//!
//! ```rust,ignore
//! let mut manager = ConcurrentManager::new(ConcurrentConfig::for_symbol_count(symbols.len()))?;
//! manager.enter()?;
//! let results = manager.execute_concurrent(&symbols, task, None).await;
//! manager.exit().await;
//! ```

use crate::config::ConcurrentConfig;
use crate::error::{BatchError, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::task::{ProgressCallback, ProgressEvent, SymbolTask, TaskResult, TaskStatus};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

/// Fallback wait when the aggregate timeout does not fit in an `Instant`
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type RunningSet = Arc<Mutex<HashSet<String>>>;

/// Worker pool owned by an entered manager
struct WorkerPool {
    semaphore: Arc<Semaphore>,
    /// Aborted task sets left behind by timed out executions
    abandoned: Mutex<Vec<BoxFuture<'static, ()>>>,
}

/// Executes symbol tasks with bounded parallelism, rate limiting and retries
pub struct ConcurrentManager {
    config: ConcurrentConfig,
    rate_limiter: Arc<RateLimiter>,
    running: RunningSet,
    pool: Option<WorkerPool>,
}

impl ConcurrentManager {
    /// Create a manager; the configuration is validated here
    pub fn new(config: ConcurrentConfig) -> Result<Self> {
        config.validate()?;
        let rate_limiter = Arc::new(RateLimiter::with_interval(config.api_rate_limit));

        Ok(Self {
            config,
            rate_limiter,
            running: Arc::new(Mutex::new(HashSet::new())),
            pool: None,
        })
    }

    /// Acquire the worker pool
    pub fn enter(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Err(BatchError::AlreadyEntered);
        }

        debug!(
            max_workers = self.config.max_workers,
            "Creating worker pool"
        );
        self.pool = Some(WorkerPool {
            semaphore: Arc::new(Semaphore::new(self.config.max_workers)),
            abandoned: Mutex::new(Vec::new()),
        });
        Ok(())
    }

    /// Release the worker pool, waiting for abandoned work to wind down
    pub async fn exit(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };

        pool.semaphore.close();
        let abandoned = std::mem::take(&mut *pool.abandoned.lock());
        if !abandoned.is_empty() {
            debug!("Waiting for {} abandoned task sets", abandoned.len());
            join_all(abandoned).await;
        }
        debug!("Worker pool released");
    }

    /// Whether the manager currently owns a worker pool
    pub fn is_entered(&self) -> bool {
        self.pool.is_some()
    }

    pub fn config(&self) -> &ConcurrentConfig {
        &self.config
    }

    /// Limiter shared by every worker of this manager
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Symbols currently inside a worker
    pub fn running_tasks(&self) -> HashSet<String> {
        self.running.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.running.lock().is_empty()
    }

    /// Run every symbol concurrently and collect one result per symbol
    ///
    /// All tasks are submitted at once; at most `max_workers` execute at a
    /// time. Results arrive in completion order. Tasks still unfinished after
    /// `symbols.len() * timeout_per_task` are aborted and reported as failed.
    pub async fn execute_concurrent<S>(
        &self,
        symbols: &[String],
        task: Arc<S>,
        progress: Option<ProgressCallback<S::Output>>,
    ) -> Result<Vec<TaskResult<S::Output>>>
    where
        S: SymbolTask,
    {
        let pool = self.pool.as_ref().ok_or(BatchError::ScopeRequired)?;
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let max_attempts = self.config.max_retries;
        let aggregate_timeout = self.config.aggregate_timeout(symbols.len());
        let started = Instant::now();
        let deadline = started
            .checked_add(aggregate_timeout)
            .unwrap_or_else(|| started + MAX_WAIT);

        let worker = Worker {
            semaphore: Arc::clone(&pool.semaphore),
            limiter: Arc::clone(&self.rate_limiter),
            running: Arc::clone(&self.running),
            policy: RetryPolicy::from(&self.config),
            task,
            progress: progress.clone(),
        };

        let mut join_set = JoinSet::new();
        for (index, symbol) in symbols.iter().enumerate() {
            let worker = worker.clone();
            let symbol = symbol.clone();
            join_set.spawn(async move { (index, worker.run(symbol).await) });
        }

        let mut finished = vec![false; symbols.len()];
        let mut results = Vec::with_capacity(symbols.len());
        let mut timed_out = false;

        loop {
            match timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((index, result)))) => {
                    finished[index] = true;
                    notify(progress.as_ref(), &result);
                    results.push(result);
                }
                Ok(Some(Err(e))) => {
                    warn!("Worker ended without a result: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if !join_set.is_empty() {
            warn!(
                "Aggregate timeout of {:?} reached with {} tasks outstanding",
                aggregate_timeout,
                join_set.len()
            );
            join_set.abort_all();
            pool.abandoned.lock().push(
                async move { while join_set.join_next().await.is_some() {} }.boxed(),
            );
        }

        let error = if timed_out {
            format!("Task timed out after {aggregate_timeout:?}")
        } else {
            "Task execution exception: worker cancelled".to_string()
        };
        for (symbol, _) in symbols.iter().zip(&finished).filter(|(_, done)| !**done) {
            let result = TaskResult::failure(symbol, error.clone(), max_attempts, started.elapsed());
            notify(progress.as_ref(), &result);
            results.push(result);
        }

        Ok(results)
    }

    /// Run symbols in sequential chunks of `batch_size`
    ///
    /// Each chunk is executed with [`execute_concurrent`](Self::execute_concurrent);
    /// the manager pauses for `batch_pause` between chunks to bound bursts.
    pub async fn execute_batched<S>(
        &self,
        symbols: &[String],
        task: Arc<S>,
        progress: Option<ProgressCallback<S::Output>>,
    ) -> Result<Vec<TaskResult<S::Output>>>
    where
        S: SymbolTask,
    {
        if self.pool.is_none() {
            return Err(BatchError::ScopeRequired);
        }

        let batch_size = self.config.batch_size;
        let total_batches = symbols.len().div_ceil(batch_size);
        let mut all_results = Vec::with_capacity(symbols.len());

        for (i, chunk) in symbols.chunks(batch_size).enumerate() {
            info!(
                "Processing batch {}/{}: {} symbols",
                i + 1,
                total_batches,
                chunk.len()
            );

            let results = self
                .execute_concurrent(chunk, Arc::clone(&task), progress.clone())
                .await?;
            all_results.extend(results);

            if i + 1 < total_batches {
                sleep(self.config.batch_pause).await;
            }
        }

        Ok(all_results)
    }
}

impl Drop for ConcurrentManager {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };

        debug!("ConcurrentManager dropped while entered; aborting outstanding work");
        pool.semaphore.close();
        // Each abandoned future owns an aborted JoinSet; dropping it cancels the tasks
        pool.abandoned.lock().clear();
    }
}

impl std::fmt::Debug for ConcurrentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentManager")
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .field("entered", &self.is_entered())
            .finish_non_exhaustive()
    }
}

/// Everything a spawned task needs to run one symbol
struct Worker<S: SymbolTask> {
    semaphore: Arc<Semaphore>,
    limiter: Arc<RateLimiter>,
    running: RunningSet,
    policy: RetryPolicy,
    task: Arc<S>,
    progress: Option<ProgressCallback<S::Output>>,
}

impl<S: SymbolTask> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Self {
            semaphore: Arc::clone(&self.semaphore),
            limiter: Arc::clone(&self.limiter),
            running: Arc::clone(&self.running),
            policy: self.policy.clone(),
            task: Arc::clone(&self.task),
            progress: self.progress.clone(),
        }
    }
}

impl<S: SymbolTask> Worker<S> {
    async fn run(self, symbol: String) -> TaskResult<S::Output> {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;

        let Ok(_permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            return TaskResult::failure(
                symbol,
                "Task execution exception: worker pool closed",
                max_attempts,
                start.elapsed(),
            );
        };
        let _running = RunningGuard::register(&self.running, &symbol);
        if let Some(progress) = &self.progress {
            progress(ProgressEvent {
                symbol: &symbol,
                status: TaskStatus::Running,
                result: None,
            });
        }

        let execution = self
            .policy
            .execute(&symbol, &self.limiter, |_attempt| self.task.run(&symbol));
        let outcome = AssertUnwindSafe(execution).catch_unwind().await;

        match outcome {
            Ok(RetryOutcome {
                result: Ok(value),
                attempts,
            }) => TaskResult::success(symbol, value, attempts, start.elapsed()),
            Ok(RetryOutcome {
                result: Err(error),
                attempts,
            }) => TaskResult::failure(symbol, error, attempts, start.elapsed()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Task for {} panicked: {}", symbol, message);
                TaskResult::failure(
                    symbol,
                    format!("Task execution exception: {message}"),
                    max_attempts,
                    start.elapsed(),
                )
            }
        }
    }
}

/// Keeps a symbol in the running set for the guard's lifetime
struct RunningGuard {
    running: RunningSet,
    symbol: String,
}

impl RunningGuard {
    fn register(running: &RunningSet, symbol: &str) -> Self {
        running.lock().insert(symbol.to_string());
        Self {
            running: Arc::clone(running),
            symbol: symbol.to_string(),
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.symbol);
    }
}

fn notify<T>(progress: Option<&ProgressCallback<T>>, result: &TaskResult<T>) {
    if let Some(progress) = progress {
        progress(ProgressEvent {
            symbol: &result.symbol,
            status: result.status(),
            result: Some(result),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressTracker;
    use crate::task::progress_callback;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn fast_config() -> ConcurrentConfig {
        ConcurrentConfig::builder()
            .max_workers(4)
            .api_rate_limit(Duration::ZERO)
            .retry_delay(Duration::from_millis(1))
            .timeout_per_task(Duration::from_secs(5))
            .batch_pause(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    async fn entered(config: ConcurrentConfig) -> ConcurrentManager {
        let mut manager = ConcurrentManager::new(config).unwrap();
        manager.enter().unwrap();
        manager
    }

    fn echo_task() -> Arc<impl SymbolTask<Output = String>> {
        Arc::new(|symbol: String| async move { Ok::<_, anyhow::Error>(format!("{symbol}-ok")) })
    }

    #[tokio::test]
    async fn test_execute_requires_scope() {
        let manager = ConcurrentManager::new(fast_config()).unwrap();
        let result = manager
            .execute_concurrent(&symbols(&["AAPL"]), echo_task(), None)
            .await;
        assert!(matches!(result, Err(BatchError::ScopeRequired)));

        let result = manager
            .execute_batched(&symbols(&["AAPL"]), echo_task(), None)
            .await;
        assert!(matches!(result, Err(BatchError::ScopeRequired)));
    }

    #[tokio::test]
    async fn test_scope_lifecycle() {
        let mut manager = ConcurrentManager::new(fast_config()).unwrap();
        manager.enter().unwrap();
        assert!(manager.is_entered());
        assert!(matches!(manager.enter(), Err(BatchError::AlreadyEntered)));

        manager.exit().await;
        assert!(!manager.is_entered());
        let result = manager
            .execute_concurrent(&symbols(&["AAPL"]), echo_task(), None)
            .await;
        assert!(matches!(result, Err(BatchError::ScopeRequired)));

        // A manager can be entered again after exit
        manager.enter().unwrap();
        manager.exit().await;
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ConcurrentConfig {
            max_workers: 0,
            ..ConcurrentConfig::default()
        };
        assert!(matches!(
            ConcurrentManager::new(config),
            Err(BatchError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_result_per_symbol() {
        let mut manager = entered(fast_config()).await;
        let input = symbols(&["AAPL", "MSFT", "GOOGL", "TSLA", "AMZN", "NVDA", "META", "NFLX"]);

        let results = manager
            .execute_concurrent(&input, echo_task(), None)
            .await
            .unwrap();
        manager.exit().await;

        assert_eq!(results.len(), input.len());
        let by_symbol: HashMap<_, _> = results.iter().map(|r| (r.symbol.clone(), r)).collect();
        assert_eq!(by_symbol.len(), input.len());
        for symbol in &input {
            let result = by_symbol[symbol];
            assert!(result.is_success());
            assert_eq!(result.value(), Some(&format!("{symbol}-ok")));
            assert_eq!(result.attempts, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_symbol_uses_all_attempts() {
        let config = fast_config();
        let max_retries = config.max_retries;
        let mut manager = entered(config).await;
        let input = symbols(&["AAPL", "MSFT", "GOOGL", "TSLA", "AMZN", "NVDA", "META", "BAD"]);

        let task = Arc::new(|symbol: String| async move {
            if symbol == "BAD" {
                Err(anyhow!("No data found, symbol may be delisted"))
            } else {
                Ok(symbol)
            }
        });

        let results = manager.execute_concurrent(&input, task, None).await.unwrap();
        manager.exit().await;

        let (ok, failed): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_success());
        assert_eq!(ok.len(), 7);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].symbol, "BAD");
        assert_eq!(failed[0].attempts, max_retries);
        assert!(failed[0].error().unwrap().contains("No data found"));
        assert!(ok.iter().all(|r| r.attempts == 1));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut manager = entered(fast_config()).await;
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let task = Arc::new(move |symbol: String| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow!("connection reset"))
                } else {
                    Ok(symbol)
                }
            }
        });

        let results = manager
            .execute_concurrent(&symbols(&["AAPL"]), task, None)
            .await
            .unwrap();
        manager.exit().await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_callbacks_fire_once_per_transition() {
        let mut manager = entered(fast_config()).await;
        let input = symbols(&["AAPL", "MSFT", "FLAKY", "BAD"]);
        let events: Arc<Mutex<Vec<(String, TaskStatus)>>> = Arc::new(Mutex::new(Vec::new()));

        let flaky_calls = Arc::new(AtomicU32::new(0));
        let task = Arc::new(move |symbol: String| {
            let flaky_calls = Arc::clone(&flaky_calls);
            async move {
                match symbol.as_str() {
                    "BAD" => Err(anyhow!("always fails")),
                    "FLAKY" if flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 => {
                        Err(anyhow!("timeout"))
                    }
                    _ => Ok(()),
                }
            }
        });

        let recorded = Arc::clone(&events);
        let callback = progress_callback(move |event: ProgressEvent<'_, ()>| {
            recorded.lock().push((event.symbol.to_string(), event.status));
        });

        let results = manager
            .execute_concurrent(&input, task, Some(callback))
            .await
            .unwrap();
        manager.exit().await;
        assert_eq!(results.len(), 4);

        let events = events.lock();
        for symbol in &input {
            let statuses: Vec<_> = events
                .iter()
                .filter(|(s, _)| s == symbol)
                .map(|(_, status)| *status)
                .collect();
            let expected = if symbol == "BAD" {
                TaskStatus::Failed
            } else {
                TaskStatus::Completed
            };
            assert_eq!(statuses, vec![TaskStatus::Running, expected], "{symbol}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_is_bounded() {
        let config = ConcurrentConfig {
            max_workers: 2,
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let task = Arc::new(move |_symbol: String| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }
        });

        let input: Vec<String> = (0..8).map(|i| format!("SYM{i}")).collect();
        let results = manager.execute_concurrent(&input, task, None).await.unwrap();
        manager.exit().await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(!manager.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rate_limit_serializes_calls() {
        let config = ConcurrentConfig {
            max_workers: 3,
            api_rate_limit: Duration::from_millis(200),
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let input = symbols(&["AAPL", "MSFT", "GOOGL", "TSLA", "AMZN"]);

        let start = std::time::Instant::now();
        let results = manager
            .execute_concurrent(&input, echo_task(), None)
            .await
            .unwrap();
        let elapsed = start.elapsed();
        manager.exit().await;

        assert_eq!(results.len(), 5);
        assert!(
            elapsed + Duration::from_millis(30) >= Duration::from_millis(800),
            "finished in {elapsed:?}"
        );
        assert_eq!(manager.rate_limiter().permits_granted(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_aggregate_timeout_converts_to_failures() {
        let config = ConcurrentConfig {
            timeout_per_task: Duration::from_millis(50),
            ..fast_config()
        };
        let max_retries = config.max_retries;
        let mut manager = entered(config).await;

        let task = Arc::new(|symbol: String| async move {
            if symbol == "SLOW" {
                sleep(Duration::from_secs(30)).await;
            }
            Ok::<_, anyhow::Error>(symbol)
        });

        let start = std::time::Instant::now();
        let results = manager
            .execute_concurrent(&symbols(&["FAST", "SLOW"]), task, None)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));

        assert_eq!(results.len(), 2);
        let slow = results.iter().find(|r| r.symbol == "SLOW").unwrap();
        assert!(!slow.is_success());
        assert!(slow.error().unwrap().contains("timed out"));
        assert_eq!(slow.attempts, max_retries);
        assert!(results.iter().any(|r| r.symbol == "FAST" && r.is_success()));

        // Abandoned work is aborted, so releasing the pool is quick
        manager.exit().await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!manager.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_becomes_failed_result() {
        let config = fast_config();
        let max_retries = config.max_retries;
        let mut manager = entered(config).await;

        let task = Arc::new(|symbol: String| async move {
            assert!(symbol != "BOOM", "analysis blew up");
            Ok::<_, anyhow::Error>(symbol)
        });

        let results = manager
            .execute_concurrent(&symbols(&["AAPL", "BOOM"]), task, None)
            .await
            .unwrap();
        manager.exit().await;

        assert_eq!(results.len(), 2);
        let boom = results.iter().find(|r| r.symbol == "BOOM").unwrap();
        assert_eq!(boom.attempts, max_retries);
        let error = boom.error().unwrap();
        assert!(error.starts_with("Task execution exception"));
        assert!(error.contains("analysis blew up"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_execute_batched_covers_all_chunks() {
        let config = ConcurrentConfig {
            batch_size: 3,
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let task = Arc::new(move |symbol: String| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(symbol)
            }
        });

        let input: Vec<String> = (0..7).map(|i| format!("SYM{i}")).collect();
        let results = manager.execute_batched(&input, task, None).await.unwrap();
        manager.exit().await;

        assert_eq!(results.len(), 7);
        let seen: HashSet<_> = results.iter().map(|r| r.symbol.clone()).collect();
        assert_eq!(seen, input.iter().cloned().collect());
        // Chunks run one after another, so no more than a chunk is in flight
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_running_reported_before_rate_limit_wait() {
        let config = ConcurrentConfig {
            max_workers: 3,
            api_rate_limit: Duration::from_millis(300),
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let input = symbols(&["AAPL", "MSFT", "GOOGL"]);

        let tracker = Arc::new(ProgressTracker::<()>::new());
        tracker.initialize(&input);
        let events = Arc::clone(&tracker);
        let callback = progress_callback(move |event: ProgressEvent<'_, ()>| match event.status {
            TaskStatus::Running => {
                events.start_task(event.symbol);
            }
            TaskStatus::Completed => {
                events.complete_task(event.symbol, ());
            }
            TaskStatus::Failed => {
                events.fail_task(event.symbol, "failed");
            }
            TaskStatus::Pending => {}
        });

        let task = Arc::new(|_symbol: String| async move {
            sleep(Duration::from_millis(900)).await;
            Ok::<_, anyhow::Error>(())
        });

        // Two of the three workers are still queued on the limiter at this point
        let observe = async {
            sleep(Duration::from_millis(100)).await;
            (manager.running_tasks().len(), tracker.get_current_stats())
        };
        let (results, (running, stats)) = tokio::join!(
            manager.execute_concurrent(&input, task, Some(callback)),
            observe
        );
        manager.exit().await;

        assert_eq!(running, 3);
        assert_eq!(stats.running, running);
        assert_eq!(stats.pending, 0);
        assert!(stats.is_consistent());

        assert_eq!(results.unwrap().len(), 3);
        assert_eq!(tracker.get_current_stats().completed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_pause_separates_chunks() {
        let config = ConcurrentConfig {
            batch_size: 2,
            batch_pause: Duration::from_millis(50),
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let input: Vec<String> = (0..5).map(|i| format!("SYM{i}")).collect();

        let start = std::time::Instant::now();
        let results = manager.execute_batched(&input, echo_task(), None).await.unwrap();
        let elapsed = start.elapsed();
        manager.exit().await;

        assert_eq!(results.len(), 5);
        // Three chunks, two pauses
        assert!(elapsed >= Duration::from_millis(100), "finished in {elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drop_while_entered_cancels_abandoned_work() {
        let config = ConcurrentConfig {
            timeout_per_task: Duration::from_millis(50),
            ..fast_config()
        };
        let mut manager = entered(config).await;
        let marker = Arc::new(());

        let held = Arc::clone(&marker);
        let task = Arc::new(move |symbol: String| {
            let held = Arc::clone(&held);
            async move {
                if symbol == "SLOW" {
                    let _held = held;
                    sleep(Duration::from_secs(30)).await;
                }
                Ok::<_, anyhow::Error>(symbol)
            }
        });

        let results = manager
            .execute_concurrent(&symbols(&["FAST", "SLOW"]), task, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        // No exit(): dropping the manager must release the abandoned task
        drop(manager);
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while Arc::strong_count(&marker) > 1 && std::time::Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut manager = entered(fast_config()).await;
        let results = manager.execute_concurrent(&[], echo_task(), None).await.unwrap();
        assert!(results.is_empty());
        let results = manager.execute_batched(&[], echo_task(), None).await.unwrap();
        assert!(results.is_empty());
        manager.exit().await;
    }
}
