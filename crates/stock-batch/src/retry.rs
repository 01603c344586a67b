//! Retry logic with linear backoff
//!
//! Every attempt first takes a permit from the shared [`RateLimiter`], so
//! retries are throttled exactly like first attempts.

use crate::config::ConcurrentConfig;
use crate::rate_limiter::RateLimiter;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Value of the successful attempt, or the text of the last error
    pub result: Result<T, String>,

    /// Attempts made; equals `max_attempts` on failure
    pub attempts: u32,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Backoff unit; the wait after attempt `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&ConcurrentConfig> for RetryPolicy {
    fn from(config: &ConcurrentConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self::new(3, Duration::from_millis(10))
    }

    /// Backoff after a failed `attempt`
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Execute an async operation with retry logic
    ///
    /// `operation` receives the 1-based attempt number. Errors are flattened
    /// to text; the last one is reported when every attempt fails.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        limiter: &RateLimiter,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            limiter.acquire().await;
            debug!(
                "Attempt {}/{} for {}",
                attempt, self.max_attempts, operation_name
            );

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded after {} attempts", operation_name, attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let message = format!("{e:#}");

                    if attempt < self.max_attempts {
                        let backoff = self.backoff_duration(attempt);
                        warn!(
                            "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                            operation_name, attempt, self.max_attempts, message, backoff
                        );
                        sleep(backoff).await;
                    }

                    last_error = Some(message);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            "{} failed after {} attempts: {}",
            operation_name, self.max_attempts, error
        );

        RetryOutcome {
            result: Err(error),
            attempts: self.max_attempts,
        }
    }
}
