//! Per-symbol tasks run by the CLI

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use stock_batch::SymbolTask;
use yahoo_finance_api as yahoo;

/// Latest daily quote of a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Quote {
    /// Close relative to open, in percent
    pub fn change_percent(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }
}

/// Fetches the latest quote from Yahoo Finance
pub struct YahooQuoteTask {
    provider: yahoo::YahooConnector,
}

impl YahooQuoteTask {
    pub fn new() -> anyhow::Result<Self> {
        let provider = yahoo::YahooConnector::new()
            .map_err(|e| anyhow!("Failed to create Yahoo Finance connector: {e}"))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl SymbolTask for YahooQuoteTask {
    type Output = Quote;

    async fn run(&self, symbol: &str) -> anyhow::Result<Quote> {
        let response = self
            .provider
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| anyhow!("Yahoo Finance request for {symbol} failed: {e}"))?;

        let quote = response
            .last_quote()
            .map_err(|e| anyhow!("No data found for {symbol}, symbol may be delisted ({e})"))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            timestamp: DateTime::from_timestamp(quote.timestamp as i64, 0)
                .unwrap_or_else(Utc::now),
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume,
        })
    }
}

/// Offline stand-in for [`YahooQuoteTask`]
///
/// Sleeps for `latency`, fails for the configured symbols and otherwise
/// returns a quote derived from the symbol's characters.
#[derive(Debug, Clone, Default)]
pub struct SimulatedQuoteTask {
    latency: Duration,
    failing: HashSet<String>,
}

impl SimulatedQuoteTask {
    pub fn new(latency: Duration, failing: impl IntoIterator<Item = String>) -> Self {
        Self {
            latency,
            failing: failing
                .into_iter()
                .map(|symbol| symbol.trim().to_uppercase())
                .collect(),
        }
    }

    fn quote_for(symbol: &str) -> Quote {
        let seed: u32 = symbol.bytes().map(u32::from).sum();
        let open = 50.0 + f64::from(seed % 450);
        let close = open * (1.0 + f64::from(seed % 7) / 100.0 - 0.03);

        Quote {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            open,
            high: open.max(close) * 1.01,
            low: open.min(close) * 0.99,
            close,
            volume: u64::from(seed) * 10_000,
        }
    }
}

#[async_trait]
impl SymbolTask for SimulatedQuoteTask {
    type Output = Quote;

    async fn run(&self, symbol: &str) -> anyhow::Result<Quote> {
        tokio::time::sleep(self.latency).await;

        if self.failing.contains(symbol) {
            return Err(anyhow!("No data found for {symbol}, symbol may be delisted"));
        }
        Ok(Self::quote_for(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_task() {
        let task = SimulatedQuoteTask::new(Duration::ZERO, vec!["zzzz ".to_string()]);

        let quote = task.run("AAPL").await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert!(quote.low <= quote.open.min(quote.close));
        assert!(quote.high >= quote.open.max(quote.close));

        let err = task.run("ZZZZ").await.unwrap_err();
        assert!(err.to_string().contains("No data found"));
    }

    #[tokio::test]
    async fn test_simulated_quotes_are_deterministic() {
        let task = SimulatedQuoteTask::default();
        let a = task.run("MSFT").await.unwrap();
        let b = task.run("MSFT").await.unwrap();
        assert_eq!((a.open, a.close, a.volume), (b.open, b.close, b.volume));
    }

    #[test]
    fn test_change_percent() {
        let quote = Quote {
            symbol: "AAPL".to_string(),
            timestamp: Utc::now(),
            open: 100.0,
            high: 111.0,
            low: 99.0,
            close: 110.0,
            volume: 1,
        };
        assert!((quote.change_percent() - 10.0).abs() < 1e-9);
        assert_eq!(Quote { open: 0.0, ..quote }.change_percent(), 0.0);
    }
}
