//! `tiers` command: show the configuration picked for batch sizes

use comfy_table::Table;
use stock_batch::progress::format_duration;
use stock_batch::{ConcurrentConfig, ExecutionMode, Tier};

/// Counts shown when none are given: both edges of every tier
pub const DEFAULT_COUNTS: [usize; 7] = [1, 5, 6, 20, 21, 50, 51];

pub fn run(counts: &[usize]) {
    let counts = if counts.is_empty() {
        &DEFAULT_COUNTS[..]
    } else {
        counts
    };
    println!("{}", render_tiers(counts));
}

fn render_tiers(counts: &[usize]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Symbols", "Tier", "Workers", "Rate limit", "Batch size", "Timeout", "Retries", "Mode",
    ]);

    for &count in counts {
        let tier = Tier::for_symbol_count(count);
        let config = ConcurrentConfig::for_tier(tier);
        let mode = if ExecutionMode::Auto.is_batched(count) {
            ExecutionMode::Batched
        } else {
            ExecutionMode::Concurrent
        };

        table.add_row(vec![
            count.to_string(),
            tier.as_str().to_string(),
            config.max_workers.to_string(),
            format!("{:.2}s", config.api_rate_limit.as_secs_f64()),
            config.batch_size.to_string(),
            format_duration(config.timeout_per_task),
            config.max_retries.to_string(),
            mode.to_string(),
        ]);
    }

    table
}
