//! Configuration for concurrent batch execution

use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "STOCK_BATCH_";

/// Concurrency profile selected from the number of symbols in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Up to 5 symbols: fast processing
    Small,
    /// 6 to 20 symbols: balance throughput and stability
    Medium,
    /// More than 20 symbols: conservative API usage
    Large,
}

impl Tier {
    /// Select the tier for a symbol count
    pub fn for_symbol_count(count: usize) -> Self {
        match count {
            0..=5 => Self::Small,
            6..=20 => Self::Medium,
            _ => Self::Large,
        }
    }

    /// Human readable tier name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

/// Configuration for a [`ConcurrentManager`](crate::concurrent::ConcurrentManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrentConfig {
    /// Maximum number of tasks executing at the same time
    pub max_workers: usize,

    /// Minimum interval between two permitted API calls (zero disables limiting)
    #[serde(with = "secs")]
    pub api_rate_limit: Duration,

    /// Chunk size used by batched execution
    pub batch_size: usize,

    /// Time budget per task; the aggregate wait is `tasks * timeout_per_task`
    #[serde(with = "secs")]
    pub timeout_per_task: Duration,

    /// Maximum attempts per task, including the first one
    pub max_retries: u32,

    /// Base unit of the linear retry backoff
    #[serde(with = "secs")]
    pub retry_delay: Duration,

    /// Pause between chunks in batched execution
    #[serde(with = "secs")]
    pub batch_pause: Duration,
}

impl Default for ConcurrentConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            api_rate_limit: Duration::from_millis(200),
            batch_size: 10,
            timeout_per_task: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            batch_pause: Duration::from_millis(500),
        }
    }
}

impl ConcurrentConfig {
    /// Create a new configuration builder
    pub fn builder() -> ConcurrentConfigBuilder {
        ConcurrentConfigBuilder::default()
    }

    /// Optimized configuration for the given number of symbols
    pub fn for_symbol_count(count: usize) -> Self {
        Self::for_tier(Tier::for_symbol_count(count))
    }

    /// Configuration profile of a tier
    pub fn for_tier(tier: Tier) -> Self {
        let defaults = Self::default();
        match tier {
            Tier::Small => Self {
                max_workers: 3,
                api_rate_limit: Duration::from_millis(100),
                batch_size: 5,
                timeout_per_task: Duration::from_secs(20),
                max_retries: 2,
                ..defaults
            },
            Tier::Medium => Self {
                max_workers: 6,
                api_rate_limit: Duration::from_millis(150),
                batch_size: 10,
                timeout_per_task: Duration::from_secs(25),
                max_retries: 3,
                ..defaults
            },
            Tier::Large => Self {
                max_workers: 8,
                api_rate_limit: Duration::from_millis(200),
                batch_size: 15,
                timeout_per_task: Duration::from_secs(30),
                max_retries: 3,
                ..defaults
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(BatchError::InvalidConfig(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(BatchError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(BatchError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.timeout_per_task.is_zero() {
            return Err(BatchError::InvalidConfig(
                "timeout_per_task must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Backoff before the retry that follows `attempt` (linear)
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }

    /// Total time the engine waits for `task_count` tasks
    pub fn aggregate_timeout(&self, task_count: usize) -> Duration {
        let count = u32::try_from(task_count).unwrap_or(u32::MAX);
        self.timeout_per_task.saturating_mul(count)
    }

    /// Apply `STOCK_BATCH_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Keys are the `STOCK_BATCH_*` names; durations are given in seconds.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = parse_override::<usize>(&lookup, "MAX_WORKERS")? {
            self.max_workers = workers;
        }
        if let Some(interval) = parse_secs_override(&lookup, "RATE_LIMIT")? {
            self.api_rate_limit = interval;
        }
        if let Some(size) = parse_override::<usize>(&lookup, "BATCH_SIZE")? {
            self.batch_size = size;
        }
        if let Some(timeout) = parse_secs_override(&lookup, "TIMEOUT")? {
            self.timeout_per_task = timeout;
        }
        if let Some(retries) = parse_override::<u32>(&lookup, "MAX_RETRIES")? {
            self.max_retries = retries;
        }
        if let Some(delay) = parse_secs_override(&lookup, "RETRY_DELAY")? {
            self.retry_delay = delay;
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{ENV_PREFIX}{name}");
    lookup(&key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| BatchError::InvalidConfig(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

fn parse_secs_override(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Duration>> {
    let Some(secs) = parse_override::<f64>(lookup, name)? else {
        return Ok(None);
    };
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| BatchError::InvalidConfig(format!("{ENV_PREFIX}{name}={secs}: {e}")))
}

/// How a batch picks its concurrency configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigStrategy {
    /// Choose a tier from the symbol count
    #[default]
    Auto,
    /// Use the given configuration as is
    Fixed(ConcurrentConfig),
}

impl ConfigStrategy {
    /// Resolve the configuration for a batch of `symbol_count` symbols
    pub fn resolve(&self, symbol_count: usize) -> ConcurrentConfig {
        match self {
            Self::Auto => ConcurrentConfig::for_symbol_count(symbol_count),
            Self::Fixed(config) => config.clone(),
        }
    }
}

/// Builder for ConcurrentConfig
#[derive(Debug, Default)]
pub struct ConcurrentConfigBuilder {
    max_workers: Option<usize>,
    api_rate_limit: Option<Duration>,
    batch_size: Option<usize>,
    timeout_per_task: Option<Duration>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    batch_pause: Option<Duration>,
}

impl ConcurrentConfigBuilder {
    /// Set the worker count
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Set the minimum interval between API calls
    pub fn api_rate_limit(mut self, interval: Duration) -> Self {
        self.api_rate_limit = Some(interval);
        self
    }

    /// Set the chunk size for batched execution
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the per-task time budget
    pub fn timeout_per_task(mut self, timeout: Duration) -> Self {
        self.timeout_per_task = Some(timeout);
        self
    }

    /// Set the maximum attempts per task
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the retry backoff unit
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the pause between chunks
    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = Some(pause);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ConcurrentConfig> {
        let defaults = ConcurrentConfig::default();

        let config = ConcurrentConfig {
            max_workers: self.max_workers.unwrap_or(defaults.max_workers),
            api_rate_limit: self.api_rate_limit.unwrap_or(defaults.api_rate_limit),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            timeout_per_task: self.timeout_per_task.unwrap_or(defaults.timeout_per_task),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            batch_pause: self.batch_pause.unwrap_or(defaults.batch_pause),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Serde adapter storing a [`Duration`] as fractional seconds
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
