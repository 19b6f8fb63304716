use std::time::Duration;

use crate::TaskStatus;

/// Render-ready snapshot of the monitor with all display values precomputed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskViewModel {
    pub status: TaskStatus,
    pub processed: u64,
    pub total: u64,
    /// Server-reported percentage, never recomputed locally.
    pub percentage: f64,
    /// Share of processed items that raised no error, 0..=100.
    pub success_rate: f64,
    pub error_count: u64,
    /// Wall time since the run started; frozen once the run ends.
    pub elapsed: Option<Duration>,
    /// Linear estimate of time left; `None` renders as the unknown sentinel.
    pub remaining: Option<Duration>,
    pub session_id: Option<String>,
    pub log_entries: usize,
    pub dirty: bool,
}
