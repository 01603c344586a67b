//! `analyze` command: run a quote task over many symbols

use crate::quote::{Quote, SimulatedQuoteTask, YahooQuoteTask};
use crate::symbols::normalize_symbols;
use anyhow::{Context, bail};
use clap::Args;
use comfy_table::{Cell, Color, Table};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stock_batch::progress::format_duration;
use stock_batch::{BatchAnalyzer, BatchResult, ConcurrentConfig, ExecutionMode};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Symbols to analyze (space or comma separated)
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// Disable the live progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Execution mode (auto, concurrent, batched)
    #[arg(long, default_value = "auto")]
    pub mode: ExecutionMode,

    /// Maximum number of concurrent workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Minimum seconds between upstream calls
    #[arg(long, value_name = "SECS")]
    pub rate_limit: Option<f64>,

    /// Maximum attempts per symbol
    #[arg(long)]
    pub retries: Option<u32>,

    /// JSON file with a concurrency configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use a simulated task instead of Yahoo Finance
    #[arg(long)]
    pub simulate: bool,

    /// Symbols the simulated task fails for
    #[arg(long = "fail", value_name = "SYMBOL")]
    pub fail: Vec<String>,

    /// Latency of the simulated task in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub latency_ms: u64,

    /// Print the batch result as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let symbols = normalize_symbols(&args.symbols);
    if symbols.is_empty() {
        bail!("No symbols to analyze");
    }

    let config = resolve_config(&args, symbols.len(), |name| std::env::var(name).ok())?;
    info!(
        symbols = symbols.len(),
        mode = %args.mode,
        simulate = args.simulate,
        "Analyzing symbols"
    );

    let analyzer = BatchAnalyzer::new()
        .with_config(config)
        .with_mode(args.mode)
        .with_progress(!args.no_progress && !args.json)
        .with_summary(!args.json);

    let result = if args.simulate {
        let task = SimulatedQuoteTask::new(
            Duration::from_millis(args.latency_ms),
            args.fail.iter().cloned(),
        );
        analyzer.analyze(&symbols, Arc::new(task)).await?
    } else {
        analyzer
            .analyze(&symbols, Arc::new(YahooQuoteTask::new()?))
            .await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render_table(&symbols, &result));
    }

    Ok(())
}

/// Concurrency configuration for this run
///
/// Starts from the config file or the tier for `symbol_count`, then applies
/// environment overrides and finally the command-line flags.
fn resolve_config<F>(
    args: &AnalyzeArgs,
    symbol_count: usize,
    env: F,
) -> anyhow::Result<ConcurrentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<ConcurrentConfig>(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => ConcurrentConfig::for_symbol_count(symbol_count),
    }
    .with_overrides_from(env)?;

    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if let Some(secs) = args.rate_limit {
        config.api_rate_limit = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid --rate-limit {secs}"))?;
    }
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }

    config.validate()?;
    Ok(config)
}

/// One row per symbol, in input order
fn render_table(symbols: &[String], result: &BatchResult<Quote>) -> Table {
    let successes: HashMap<&str, _> = result
        .successes
        .iter()
        .map(|s| (s.symbol.as_str(), s))
        .collect();
    let failures: HashMap<&str, _> = result
        .failures
        .iter()
        .map(|f| (f.symbol.as_str(), f))
        .collect();

    let mut table = Table::new();
    table.set_header(vec![
        "Symbol", "Status", "Close", "Change", "Volume", "Attempts", "Time", "Error",
    ]);

    for symbol in symbols {
        if let Some(success) = successes.get(symbol.as_str()) {
            let quote = &success.payload;
            let change = quote.change_percent();
            table.add_row(vec![
                Cell::new(symbol),
                Cell::new("ok").fg(Color::Green),
                Cell::new(format!("{:.2}", quote.close)),
                Cell::new(format!("{change:+.2}%")).fg(if change >= 0.0 {
                    Color::Green
                } else {
                    Color::Red
                }),
                Cell::new(quote.volume),
                Cell::new(success.attempts),
                Cell::new(format_duration(success.duration)),
                Cell::new(""),
            ]);
        } else if let Some(failure) = failures.get(symbol.as_str()) {
            table.add_row(vec![
                Cell::new(symbol),
                Cell::new("failed").fg(Color::Red),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(failure.attempts),
                Cell::new("-"),
                Cell::new(&failure.error),
            ]);
        }
    }

    table
}
