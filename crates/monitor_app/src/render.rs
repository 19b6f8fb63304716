//! Line rendering for the terminal front-end.
//!
//! Everything here is a pure string builder over the core view model so
//! the dispatch loop stays free of formatting concerns.

use chrono::NaiveDateTime;
use monitor_core::{
    format_duration, format_remaining, LogEntry, LogLevel, TaskStatus, TaskViewModel, TIME_FORMAT,
};

pub(crate) fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Idle => "idle",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Error => "error",
        TaskStatus::Stopped => "stopped",
    }
}

fn level_tag(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Success => "ok",
        LogLevel::Warning => "warn",
        LogLevel::Error => "error",
    }
}

pub(crate) fn log_line(entry: &LogEntry) -> String {
    format!("[{}] {}", level_tag(entry.level), entry.message)
}

/// One-line progress report for a running task.
pub(crate) fn progress_line(view: &TaskViewModel) -> String {
    let elapsed = view
        .elapsed
        .map(format_duration)
        .unwrap_or_else(|| "0s".to_owned());
    format!(
        "{:.1}% ({}/{}) | errors {} | success {:.1}% | elapsed {} | remaining {}",
        view.percentage,
        view.processed,
        view.total,
        view.error_count,
        view.success_rate,
        elapsed,
        format_remaining(view.remaining)
    )
}

/// Final line printed once the run reached a terminal status.
pub(crate) fn summary_line(view: &TaskViewModel) -> String {
    let elapsed = view
        .elapsed
        .map(format_duration)
        .unwrap_or_else(|| "0s".to_owned());
    let mut line = format!(
        "{}: {} processed, {} errors, success {:.1}%, took {}",
        status_label(view.status),
        view.processed,
        view.error_count,
        view.success_rate,
        elapsed
    );
    if let Some(session) = &view.session_id {
        line.push_str(&format!(" (session {session})"));
    }
    line
}

pub(crate) fn format_window(start: NaiveDateTime, end: NaiveDateTime) -> String {
    format!(
        "{} .. {}",
        start.format(TIME_FORMAT),
        end.format(TIME_FORMAT)
    )
}
