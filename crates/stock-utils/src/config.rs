//! Configuration management utilities

use crate::error::{Result, UtilsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the deployment environment
pub const ENV_ENVIRONMENT: &str = "STOCK_BATCH_ENV";
/// Standard tracing filter variable
pub const ENV_LOG_FILTER: &str = "RUST_LOG";
/// Environment variable selecting the log output format
pub const ENV_LOG_FORMAT: &str = "STOCK_BATCH_LOG_FORMAT";

/// Output format of log records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per record
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (development, production, etc.)
    pub environment: String,
    /// `EnvFilter` directives, e.g. `info` or `stock_batch=debug`
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "stock-batch".to_string(),
            environment: "development".to_string(),
            log_filter: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by values from `lookup`; empty values are ignored
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(environment) = get(ENV_ENVIRONMENT) {
            config.environment = environment;
        }
        if let Some(filter) = get(ENV_LOG_FILTER) {
            config.log_filter = filter;
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            config.log_format = format.parse().map_err(|_| UtilsError::InvalidEnv {
                name: ENV_LOG_FORMAT.to_string(),
                value: format,
            })?;
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "production" | "prod")
    }
}
