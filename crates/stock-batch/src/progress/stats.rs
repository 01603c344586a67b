//! Progress snapshots and per-task progress records

use crate::task::TaskStatus;
use std::time::{Duration, Instant};

/// Immutable snapshot of the aggregate counters of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    pub start_time: Option<Instant>,
}

impl ProgressStats {
    /// Fresh statistics for `total` pending tasks starting now
    pub fn started(total: usize) -> Self {
        Self {
            total_tasks: total,
            pending: total,
            start_time: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// Tasks that reached a terminal state
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    /// Completed share of finished tasks, in `[0, 1]`; 0 before anything finished
    pub fn success_rate(&self) -> f64 {
        let finished = self.finished();
        if finished == 0 {
            return 0.0;
        }
        self.completed as f64 / finished as f64
    }

    /// Finished share of all tasks, in `[0, 1]`; 0 for an empty run
    pub fn completion_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.finished() as f64 / self.total_tasks as f64
    }

    pub fn elapsed_time(&self) -> Option<Duration> {
        self.start_time.map(|start| start.elapsed())
    }

    /// Remaining time extrapolated from the average completed task
    pub fn estimated_remaining(&self) -> Option<Duration> {
        self.estimated_remaining_after(self.elapsed_time()?)
    }

    /// [`estimated_remaining`](Self::estimated_remaining) for a given elapsed time
    pub fn estimated_remaining_after(&self, elapsed: Duration) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let remaining = self.total_tasks.saturating_sub(self.finished());
        let per_task = elapsed.div_f64(self.completed as f64);
        Some(per_task.mul_f64(remaining as f64))
    }

    /// Whether every task reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.running == 0
    }

    /// The per-state counters add up to the total
    pub fn is_consistent(&self) -> bool {
        self.pending + self.running + self.completed + self.failed == self.total_tasks
    }

    /// Move one task from `from` to `to`
    pub(crate) fn shift(&mut self, from: TaskStatus, to: TaskStatus) {
        let counter = self.counter_mut(from);
        *counter = counter.saturating_sub(1);
        *self.counter_mut(to) += 1;
    }

    fn counter_mut(&mut self, status: TaskStatus) -> &mut usize {
        match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
        }
    }
}

/// Progress record of a single symbol
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTask<T> {
    pub symbol: String,
    pub status: TaskStatus,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub error_message: Option<String>,
    pub result: Option<T>,
}

impl<T> AnalysisTask<T> {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            error_message: None,
            result: None,
        }
    }

    /// Execution time, known once the task started and finished
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}
