//! Live progress rendering
//!
//! A background loop polls [`ProgressStats`] snapshots at a fixed cadence and
//! hands them to a [`ProgressSink`]. The tracker's state machine never depends
//! on how (or whether) snapshots are rendered.

use super::stats::ProgressStats;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::warn;

/// Default refresh interval of the live display
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(500);

/// Width of the textual progress bar, in cells
pub const BAR_WIDTH: usize = 20;

const MIN_REFRESH: Duration = Duration::from_millis(10);
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination for progress snapshots
#[cfg_attr(test, mockall::automock)]
pub trait ProgressSink: Send + Sync {
    /// Render an intermediate snapshot
    fn render(&self, stats: &ProgressStats);

    /// Render the last snapshot when the display stops
    fn finish(&self, stats: &ProgressStats);
}

/// Renders a single carriage-return status line on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn render(&self, stats: &ProgressStats) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", status_line(stats));
        let _ = stderr.flush();
    }

    fn finish(&self, stats: &ProgressStats) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\r{}", status_line(stats));
    }
}

/// Discards every snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn render(&self, _stats: &ProgressStats) {}

    fn finish(&self, _stats: &ProgressStats) {}
}

/// One-line textual progress indicator
pub fn status_line(stats: &ProgressStats) -> String {
    let elapsed = stats
        .elapsed_time()
        .map_or_else(|| "0s".to_string(), format_duration);
    let remaining = stats
        .estimated_remaining()
        .map_or_else(|| "Calculating...".to_string(), format_duration);

    format!(
        "📊 Progress: {} {}/{} ({:.1}%) | ✅{} ❌{} 🔄{} ⏳{} | Elapsed: {} | Estimated remaining: {}",
        progress_bar(stats.completion_rate(), BAR_WIDTH),
        stats.finished(),
        stats.total_tasks,
        stats.completion_rate() * 100.0,
        stats.completed,
        stats.failed,
        stats.running,
        stats.pending,
        elapsed,
        remaining
    )
}

/// Fixed-width bar for a fraction in `[0, 1]`
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64) as usize).min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

/// Compact duration: `42s`, `3m7s` or `2h15m`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    match total {
        0..60 => format!("{total}s"),
        60..3600 => format!("{}m{}s", total / 60, total % 60),
        _ => format!("{}h{}m", total / 3600, (total % 3600) / 60),
    }
}

/// Running display loop
pub(crate) struct DisplayHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DisplayHandle {
    /// Poll `snapshot` every `refresh` and render through `sink` until stopped
    pub(crate) fn spawn<F>(refresh: Duration, sink: Arc<dyn ProgressSink>, snapshot: F) -> Self
    where
        F: Fn() -> ProgressStats + Send + 'static,
    {
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(refresh.max(MIN_REFRESH));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => sink.render(&snapshot()),
                }
            }
            sink.finish(&snapshot());
        });

        Self { stop, handle }
    }

    /// Stop the loop and wait briefly for the final frame
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(());
        if timeout(STOP_TIMEOUT, self.handle).await.is_err() {
            warn!("Progress display did not stop within {:?}", STOP_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(59_900)), "59s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m7s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m");
        assert_eq!(format_duration(Duration::from_secs(8100)), "2h15m");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "[░░░░]");
        assert_eq!(progress_bar(0.5, 4), "[██░░]");
        assert_eq!(progress_bar(1.0, 4), "[████]");
        assert_eq!(progress_bar(1.7, 4), "[████]");
        assert_eq!(progress_bar(0.5, BAR_WIDTH).chars().count(), BAR_WIDTH + 2);
    }

    #[test]
    fn test_status_line() {
        let stats = ProgressStats {
            completed: 2,
            failed: 1,
            running: 1,
            pending: 0,
            ..ProgressStats::started(4)
        };
        let line = status_line(&stats);
        assert!(line.contains("3/4 (75.0%)"));
        assert!(line.contains("✅2 ❌1 🔄1 ⏳0"));
        assert!(!line.contains("Calculating..."));

        let line = status_line(&ProgressStats::started(4));
        assert!(line.contains("Estimated remaining: Calculating..."));
    }

    #[tokio::test]
    async fn test_display_loop_renders_until_stopped() {
        let mut sink = MockProgressSink::new();
        sink.expect_render().returning(|_| ()).times(1..);
        sink.expect_finish()
            .withf(|stats| stats.total_tasks == 3)
            .times(1)
            .returning(|_| ());

        let sink = Arc::new(sink);
        let display = DisplayHandle::spawn(
            Duration::from_millis(10),
            Arc::clone(&sink) as Arc<dyn ProgressSink>,
            || ProgressStats::started(3),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        display.stop().await;

        // The loop released its handle; dropping the mock verifies the expectations
        let sink = Arc::try_unwrap(sink).ok().expect("display loop still holds the sink");
        drop(sink);
    }
}
