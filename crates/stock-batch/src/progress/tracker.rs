//! Thread-safe progress state machine

use super::display::{DisplayHandle, ProgressSink};
use super::stats::{AnalysisTask, ProgressStats};
use crate::report::{ErrorFormatter, SummaryReport};
use crate::task::TaskStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct TrackerState<T> {
    tasks: HashMap<String, AnalysisTask<T>>,
    /// Symbols in initialization order
    order: Vec<String>,
    stats: ProgressStats,
}

impl<T> Default for TrackerState<T> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            stats: ProgressStats::default(),
        }
    }
}

impl<T> TrackerState<T> {
    /// Apply a transition if it is legal for the task's current state
    fn transition(&mut self, symbol: &str, to: TaskStatus) -> Option<&mut AnalysisTask<T>> {
        let Some(task) = self.tasks.get_mut(symbol) else {
            debug!("Ignoring {} for unknown task {}", to, symbol);
            return None;
        };

        let from = task.status;
        let allowed = match to {
            TaskStatus::Running => from == TaskStatus::Pending,
            // A task can time out before it ever started
            TaskStatus::Completed | TaskStatus::Failed => !from.is_terminal(),
            TaskStatus::Pending => false,
        };
        if !allowed {
            debug!("Ignoring {} -> {} for {}", from, to, symbol);
            return None;
        }

        self.stats.shift(from, to);
        task.status = to;
        Some(task)
    }

    fn tasks_with(&self, status: TaskStatus) -> impl Iterator<Item = &AnalysisTask<T>> {
        self.order
            .iter()
            .filter_map(|symbol| self.tasks.get(symbol))
            .filter(move |task| task.status == status)
    }
}

/// Tracks Pending -> Running -> Completed/Failed for every symbol of a run
///
/// All counters live behind one mutex, so snapshots from
/// [`get_current_stats`](Self::get_current_stats) are always consistent:
/// `pending + running + completed + failed == total_tasks`.
pub struct ProgressTracker<T> {
    state: Mutex<TrackerState<T>>,
    display: Mutex<Option<DisplayHandle>>,
}

impl<T> Default for ProgressTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProgressTracker<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            display: Mutex::new(None),
        }
    }

    /// Reset the tracker with one pending task per distinct symbol
    pub fn initialize(&self, symbols: &[String]) {
        let mut state = self.state.lock();
        state.tasks.clear();
        state.order.clear();

        for symbol in symbols {
            if !state.tasks.contains_key(symbol) {
                state.tasks.insert(symbol.clone(), AnalysisTask::new(symbol.clone()));
                state.order.push(symbol.clone());
            }
        }
        state.stats = ProgressStats::started(state.order.len());
    }

    /// Pending -> Running; returns whether the transition applied
    pub fn start_task(&self, symbol: &str) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.transition(symbol, TaskStatus::Running) else {
            return false;
        };
        task.start_time = Some(Instant::now());
        true
    }

    /// Running -> Completed with the task's payload
    pub fn complete_task(&self, symbol: &str, result: T) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.transition(symbol, TaskStatus::Completed) else {
            return false;
        };
        task.end_time = Some(Instant::now());
        task.result = Some(result);
        true
    }

    /// Running -> Failed with the error text
    pub fn fail_task(&self, symbol: &str, error: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.transition(symbol, TaskStatus::Failed) else {
            return false;
        };
        task.end_time = Some(Instant::now());
        task.error_message = Some(error.into());
        true
    }

    /// Consistent snapshot of the counters
    pub fn get_current_stats(&self) -> ProgressStats {
        self.state.lock().stats.clone()
    }

    /// Symbols currently running, in initialization order
    pub fn get_running_tasks(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .tasks_with(TaskStatus::Running)
            .map(|task| task.symbol.clone())
            .collect()
    }

    /// Whether nothing is pending or running
    pub fn is_completed(&self) -> bool {
        self.state.lock().stats.is_complete()
    }

    /// Render the end-of-run summary
    pub fn render_summary(&self, formatter: Option<&ErrorFormatter>) -> String {
        let (stats, failures) = {
            let state = self.state.lock();
            let failures: Vec<(String, String)> = state
                .tasks_with(TaskStatus::Failed)
                .map(|task| {
                    (
                        task.symbol.clone(),
                        task.error_message.clone().unwrap_or_default(),
                    )
                })
                .collect();
            (state.stats.clone(), failures)
        };

        let elapsed = stats.elapsed_time().unwrap_or_default();
        let average_time = (stats.completed > 0).then(|| elapsed.div_f64(stats.completed as f64));

        SummaryReport {
            title: "📈 Multi-stock analysis summary".to_string(),
            total: stats.total_tasks,
            succeeded: stats.completed,
            failed: stats.failed,
            success_rate: stats.success_rate(),
            elapsed,
            failures,
            average_time,
        }
        .render(formatter)
    }

    /// Print the end-of-run summary to stdout
    pub fn print_summary(&self, formatter: Option<&ErrorFormatter>) {
        println!("{}", self.render_summary(formatter));
    }

    /// Stop the live display, rendering one last frame
    pub async fn stop_display(&self) {
        let display = self.display.lock().take();
        if let Some(display) = display {
            display.stop().await;
        }
    }

    pub fn is_displaying(&self) -> bool {
        self.display.lock().is_some()
    }
}

impl<T: Clone> ProgressTracker<T> {
    /// Payloads of completed tasks, in initialization order
    pub fn get_completed_results(&self) -> Vec<T> {
        let state = self.state.lock();
        state
            .tasks_with(TaskStatus::Completed)
            .filter_map(|task| task.result.clone())
            .collect()
    }

    /// Failed tasks, in initialization order
    pub fn get_failed_tasks(&self) -> Vec<AnalysisTask<T>> {
        let state = self.state.lock();
        state.tasks_with(TaskStatus::Failed).cloned().collect()
    }

    /// Progress record of one symbol
    pub fn task(&self, symbol: &str) -> Option<AnalysisTask<T>> {
        self.state.lock().tasks.get(symbol).cloned()
    }
}

impl<T: Send + 'static> ProgressTracker<T> {
    /// Start polling snapshots every `refresh` and rendering them through `sink`
    ///
    /// Does nothing when a display is already running.
    pub fn start_display(self: &Arc<Self>, refresh: Duration, sink: Arc<dyn ProgressSink>) {
        let mut display = self.display.lock();
        if display.is_some() {
            debug!("Progress display already running");
            return;
        }

        let tracker = Arc::clone(self);
        *display = Some(DisplayHandle::spawn(refresh, sink, move || {
            tracker.get_current_stats()
        }));
    }
}
