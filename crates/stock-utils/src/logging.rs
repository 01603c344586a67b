//! Logging and tracing utilities
//!
//! Log records go to stderr so that stdout stays free for reports and JSON.

use crate::config::{Config, LogFormat};
use crate::error::{Result, UtilsError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from the process environment
///
/// Shorthand for [`init_tracing_with`] over [`Config::from_env`].
pub fn init_tracing() -> Result<()> {
    init_tracing_with(&Config::from_env()?)
}

/// Initialize tracing from an application [`Config`]
pub fn init_tracing_with(config: &Config) -> Result<()> {
    let filter = build_filter(&config.log_filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| UtilsError::TracingInit(e.to_string()))
}

fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| UtilsError::InvalidFilter {
        filter: directives.to_string(),
        reason: e.to_string(),
    })
}
