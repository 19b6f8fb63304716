use std::time::Instant;

use crate::{Effect, LogLevel, MonitorState, Msg, StreamEvent, TaskStatus};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: MonitorState, msg: Msg) -> (MonitorState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartTask(config) => {
            // One run at a time; a finished run must be reset first.
            if state.status() != TaskStatus::Idle {
                return (state, Vec::new());
            }
            if let Err(err) = config.validate() {
                state.push_log(LogLevel::Error, format!("invalid task config: {err}"));
                return (state, Vec::new());
            }
            state.begin_run(config.clone(), Instant::now());
            state.push_log(LogLevel::Info, "starting batch parse task");
            vec![Effect::OpenStream { config }]
        }
        Msg::StopTask => {
            if state.status() == TaskStatus::Running {
                state.stop_run(Instant::now());
                state.push_log(LogLevel::Warning, "task stopped by user");
                vec![Effect::CancelStream]
            } else {
                Vec::new()
            }
        }
        Msg::ResetTask => {
            if state.status().is_terminal() {
                state.reset_run();
            }
            Vec::new()
        }
        Msg::ExportRequested => match (state.status(), state.run().session_id.clone()) {
            (TaskStatus::Completed, Some(session_id)) => {
                vec![Effect::ExportResults { session_id }]
            }
            _ => {
                state.push_log(LogLevel::Warning, "no completed session to export");
                Vec::new()
            }
        },
        Msg::Frame(event) => {
            apply_frame(&mut state, event);
            Vec::new()
        }
        Msg::StreamEnded => {
            // End of stream without a Complete frame is a failure, never a
            // silent success. After a terminal frame it is the normal close.
            if state.status() == TaskStatus::Running {
                state.fail_run(Instant::now());
                state.push_log(LogLevel::Error, "stream ended before the task completed");
            }
            Vec::new()
        }
        Msg::StreamFailed { message } => {
            if state.status() == TaskStatus::Running {
                state.fail_run(Instant::now());
                state.push_log(LogLevel::Error, format!("stream failed: {message}"));
            }
            Vec::new()
        }
    };

    (state, effects)
}

/// Applies one decoded frame. Frames arriving outside a running task are
/// dropped: a terminal run never mutates again.
fn apply_frame(state: &mut MonitorState, event: StreamEvent) {
    if state.status() != TaskStatus::Running {
        return;
    }
    match event {
        StreamEvent::Start { message } => state.push_log(LogLevel::Info, message),
        StreamEvent::Progress {
            current,
            total,
            percentage,
        } => state.apply_progress(current, total, percentage),
        StreamEvent::Log { message } => state.push_log(LogLevel::Info, message),
        StreamEvent::Warning { message } => {
            state.bump_error_count();
            state.push_log(LogLevel::Warning, message);
        }
        StreamEvent::Error { message } => {
            state.fail_run(Instant::now());
            state.push_log(LogLevel::Error, message);
        }
        StreamEvent::Complete {
            total_processed,
            failed_count,
            session_id,
            message,
            ..
        } => {
            state.complete_run(total_processed, failed_count, session_id, Instant::now());
            let note = message.unwrap_or_else(|| "batch parse task completed".to_owned());
            state.push_log(LogLevel::Success, note);
        }
    }
}
