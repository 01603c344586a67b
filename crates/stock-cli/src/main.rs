//! Command-line interface for stock-batch

mod commands;
mod quote;
mod symbols;

use clap::{Parser, Subcommand};
use commands::analyze::AnalyzeArgs;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "stock-batch", version)]
#[command(about = "Analyze many stock symbols concurrently", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch and summarize the latest quote of every symbol
    Analyze(AnalyzeArgs),

    /// Show the concurrency tier chosen for symbol counts
    Tiers {
        /// Symbol counts to show (defaults to every tier boundary)
        counts: Vec<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = stock_utils::Config::from_env()?;
    stock_utils::init_tracing_with(&config)?;

    let cli = Cli::parse();

    info!("Starting {}", config.app_name);
    debug!(environment = %config.environment, log_format = %config.log_format, "Loaded config");

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args).await,
        Commands::Tiers { counts } => {
            commands::tiers::run(&counts);
            Ok(())
        }
    }
}
