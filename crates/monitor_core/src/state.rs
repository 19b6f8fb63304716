use std::time::Instant;

use crate::config::TaskConfig;
use crate::timing;
use crate::view_model::TaskViewModel;

/// Lifecycle of the single batch run the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Stopped,
}

impl TaskStatus {
    /// Completed, Error and Stopped end a run; only a reset leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Stopped
        )
    }
}

/// Severity of one run-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Counters and identity of the current (or most recent) run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskRun {
    pub status: TaskStatus,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub processed: u64,
    pub total: u64,
    /// Last server-reported percentage, shown verbatim.
    pub percentage: f64,
    pub error_count: u64,
    pub session_id: Option<String>,
}

/// Whole-monitor state: one run, its log, and a render-coalescing flag.
///
/// Mutation happens only through `update`; every mutator marks the state
/// dirty so the front-end can coalesce renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitorState {
    run: TaskRun,
    config: Option<TaskConfig>,
    log: Vec<LogEntry>,
    dirty: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TaskStatus {
        self.run.status
    }

    pub fn run(&self) -> &TaskRun {
        &self.run
    }

    /// Config of the current run, kept until the next reset.
    pub fn config(&self) -> Option<&TaskConfig> {
        self.config.as_ref()
    }

    /// Ordered run log, oldest first. Cleared when a new run starts.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Render-ready snapshot; `now` anchors the elapsed/remaining math.
    pub fn view(&self, now: Instant) -> TaskViewModel {
        let elapsed = self
            .run
            .started_at
            .map(|started| self.run.finished_at.unwrap_or(now).duration_since(started));
        let remaining = match (self.run.status, elapsed) {
            (TaskStatus::Running, Some(elapsed)) => {
                timing::estimate_remaining(elapsed, self.run.percentage)
            }
            _ => None,
        };
        TaskViewModel {
            status: self.run.status,
            processed: self.run.processed,
            total: self.run.total,
            percentage: self.run.percentage,
            success_rate: timing::success_rate(self.run.processed, self.run.error_count),
            error_count: self.run.error_count,
            elapsed,
            remaining,
            session_id: self.run.session_id.clone(),
            log_entries: self.log.len(),
            dirty: self.dirty,
        }
    }

    /// Returns whether a render is due and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn begin_run(&mut self, config: TaskConfig, now: Instant) {
        self.run = TaskRun {
            status: TaskStatus::Running,
            started_at: Some(now),
            ..TaskRun::default()
        };
        self.config = Some(config);
        self.log.clear();
        self.mark_dirty();
    }

    pub(crate) fn apply_progress(&mut self, current: u64, total: u64, percentage: f64) {
        self.run.processed = current;
        self.run.total = total;
        self.run.percentage = percentage;
        self.mark_dirty();
    }

    pub(crate) fn bump_error_count(&mut self) {
        self.run.error_count += 1;
        self.mark_dirty();
    }

    pub(crate) fn complete_run(
        &mut self,
        total_processed: u64,
        failed_count: Option<u64>,
        session_id: Option<String>,
        now: Instant,
    ) {
        self.run.status = TaskStatus::Completed;
        self.run.processed = total_processed;
        // The server's final failure count is authoritative when present.
        if let Some(failed) = failed_count {
            self.run.error_count = failed;
        }
        self.run.session_id = session_id;
        self.run.finished_at = Some(now);
        self.mark_dirty();
    }

    pub(crate) fn fail_run(&mut self, now: Instant) {
        self.run.status = TaskStatus::Error;
        self.run.finished_at = Some(now);
        self.mark_dirty();
    }

    pub(crate) fn stop_run(&mut self, now: Instant) {
        self.run.status = TaskStatus::Stopped;
        self.run.finished_at = Some(now);
        self.mark_dirty();
    }

    pub(crate) fn reset_run(&mut self) {
        self.run = TaskRun::default();
        self.config = None;
        self.log.clear();
        self.mark_dirty();
    }

    pub(crate) fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push(LogEntry {
            level,
            message: message.into(),
        });
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
