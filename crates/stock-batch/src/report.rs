//! Summary reports and friendly error classification
//!
//! Classification only changes how a failure is worded in a report. It never
//! feeds back into retries or control flow.

use crate::progress::format_duration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const RULE_WIDTH: usize = 60;

/// Maps `(symbol, raw error)` to the line shown for a failed task
pub type ErrorFormatter = dyn Fn(&str, &str) -> String + Send + Sync;

/// Coarse category of a raw task error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The provider has no data for the symbol
    Delisted,
    /// Timeouts and connection problems
    Network,
    Other,
}

impl ErrorCategory {
    pub fn classify(error: &str) -> Self {
        let error = error.to_lowercase();
        if error.contains("delisted") || error.contains("no data found") {
            Self::Delisted
        } else if error.contains("timeout")
            || error.contains("timed out")
            || error.contains("connection")
        {
            Self::Network
        } else {
            Self::Other
        }
    }
}

/// Default [`ErrorFormatter`]: friendlier wording for known categories
pub fn friendly_error(symbol: &str, error: &str) -> String {
    match ErrorCategory::classify(error) {
        ErrorCategory::Delisted => format!("{symbol}: possibly delisted or no data available"),
        ErrorCategory::Network => format!("{symbol}: network issue, please retry later"),
        ErrorCategory::Other => format!("{symbol}: {error}"),
    }
}

/// Figures shown in an end-of-run summary
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub title: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Fraction in `[0, 1]`
    pub success_rate: f64,
    pub elapsed: Duration,
    /// `(symbol, raw error)` for every failed task
    pub failures: Vec<(String, String)>,
    pub average_time: Option<Duration>,
}

impl SummaryReport {
    /// Render the report; failures go through `formatter` when given
    pub fn render(&self, formatter: Option<&ErrorFormatter>) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        out.push_str(&format!("\n{rule}\n{}\n{rule}\n", self.title));
        out.push_str(&format!("📊 Total stocks: {}\n", self.total));
        out.push_str(&format!(
            "✅ Success: {} ({:.1}%)\n",
            self.succeeded,
            self.success_rate * 100.0
        ));
        out.push_str(&format!("❌ Failed: {}\n", self.failed));
        out.push_str(&format!(
            "⏱️  Total time: {}\n",
            format_duration(self.elapsed)
        ));

        if !self.failures.is_empty() {
            out.push_str("\n❌ Failed task details:\n");
            for (symbol, error) in &self.failures {
                let line = formatter.map_or_else(|| format!("{symbol}: {error}"), |f| f(symbol, error));
                out.push_str(&format!("   • {line}\n"));
            }
        }

        if let Some(average) = self.average_time {
            out.push_str(&format!(
                "📈 Average processing time: {}\n",
                format_duration(average)
            ));
        }

        out.push_str(&rule);
        out
    }
}
