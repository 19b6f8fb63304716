use std::sync::Once;
use std::time::Instant;

use chrono::NaiveDateTime;
use monitor_core::{
    update, Effect, LogLevel, MonitorState, Msg, StreamEvent, TaskConfig, TaskStatus, TIME_FORMAT,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn t(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT).unwrap()
}

fn running_state() -> MonitorState {
    let config = TaskConfig::for_range(t("2024-05-01T00:00"), t("2024-05-08T00:00"));
    let (state, _) = update(MonitorState::new(), Msg::StartTask(config));
    state
}

fn frame(state: MonitorState, event: StreamEvent) -> MonitorState {
    let (state, effects) = update(state, Msg::Frame(event));
    assert!(effects.is_empty(), "frames never emit effects");
    state
}

fn progress(current: u64, total: u64, percentage: f64) -> StreamEvent {
    StreamEvent::Progress {
        current,
        total,
        percentage,
    }
}

fn complete(total_processed: u64, session_id: Option<&str>) -> StreamEvent {
    StreamEvent::Complete {
        total_processed,
        success_count: None,
        failed_count: None,
        session_id: session_id.map(str::to_owned),
        message: None,
    }
}

#[test]
fn progress_counters_are_taken_verbatim() {
    init_logging();
    // Percentage is the server's number even when local math would differ.
    let state = frame(running_state(), progress(1, 3, 34.0));

    let run = state.run();
    assert_eq!(run.processed, 1);
    assert_eq!(run.total, 3);
    assert_eq!(run.percentage, 34.0);

    let view = state.view(Instant::now());
    assert_eq!(view.percentage, 34.0);
}

#[test]
fn progress_updates_do_not_grow_the_run_log() {
    init_logging();
    let state = running_state();
    let entries = state.log().len();

    let state = frame(state, progress(5, 100, 5.0));
    let state = frame(state, progress(6, 100, 6.0));

    assert_eq!(state.log().len(), entries);
}

#[test]
fn warnings_accumulate_into_the_error_count() {
    init_logging();
    let state = frame(
        running_state(),
        StreamEvent::Warning {
            message: "summary fallback for item 7".into(),
        },
    );
    let state = frame(
        state,
        StreamEvent::Warning {
            message: "summary fallback for item 9".into(),
        },
    );
    let state = frame(state, progress(10, 10, 100.0));

    assert_eq!(state.run().error_count, 2);
    let view = state.view(Instant::now());
    assert!((view.success_rate - 80.0).abs() < 1e-9);
    assert_eq!(state.log().last().unwrap().level, LogLevel::Warning);
}

#[test]
fn error_frame_fails_the_run() {
    init_logging();
    let state = frame(
        running_state(),
        StreamEvent::Error {
            message: "database connection lost".into(),
        },
    );

    assert_eq!(state.status(), TaskStatus::Error);
    assert_eq!(state.log().last().unwrap().level, LogLevel::Error);
    assert_eq!(state.log().last().unwrap().message, "database connection lost");
}

#[test]
fn complete_freezes_counters_and_stores_the_session() {
    init_logging();
    let state = frame(running_state(), progress(100, 100, 100.0));
    let state = frame(
        state,
        StreamEvent::Complete {
            total_processed: 100,
            success_count: Some(98),
            failed_count: Some(2),
            session_id: Some("abc123".into()),
            message: Some("batch parse finished".into()),
        },
    );

    let run = state.run();
    assert_eq!(run.status, TaskStatus::Completed);
    assert_eq!(run.processed, 100);
    assert_eq!(run.total, 100);
    // The server's final failure count wins over locally counted warnings.
    assert_eq!(run.error_count, 2);
    assert_eq!(run.session_id.as_deref(), Some("abc123"));
    assert!(run.finished_at.is_some());
    assert_eq!(state.log().last().unwrap().level, LogLevel::Success);
}

#[test]
fn zero_data_complete_is_a_success_without_a_session() {
    init_logging();
    let state = frame(running_state(), complete(0, None));

    assert_eq!(state.status(), TaskStatus::Completed);
    assert_eq!(state.run().processed, 0);
    assert_eq!(state.run().session_id, None);
    let view = state.view(Instant::now());
    assert_eq!(view.success_rate, 0.0);
    assert_eq!(view.remaining, None);
}

#[test]
fn stream_end_without_complete_is_an_error() {
    init_logging();
    let state = frame(running_state(), progress(42, 100, 42.0));
    let (state, effects) = update(state, Msg::StreamEnded);

    assert_eq!(state.status(), TaskStatus::Error);
    assert!(effects.is_empty());
    assert_eq!(state.log().last().unwrap().level, LogLevel::Error);
    // Counters keep their last observed values for the post-mortem.
    assert_eq!(state.run().processed, 42);
}

#[test]
fn stream_end_after_complete_is_the_normal_close() {
    init_logging();
    let state = frame(running_state(), complete(10, Some("abc123")));
    let (next, effects) = update(state.clone(), Msg::StreamEnded);

    assert_eq!(next, state);
    assert!(effects.is_empty());
}

#[test]
fn transport_failure_fails_a_running_task() {
    init_logging();
    let (state, _) = update(
        running_state(),
        Msg::StreamFailed {
            message: "http status 502".into(),
        },
    );

    assert_eq!(state.status(), TaskStatus::Error);
    assert_eq!(
        state.log().last().unwrap().message,
        "stream failed: http status 502"
    );
}

#[test]
fn late_frames_after_a_stop_are_dropped() {
    init_logging();
    let (state, _) = update(running_state(), Msg::StopTask);
    assert_eq!(state.status(), TaskStatus::Stopped);

    // A frame already in flight when the user stopped must not revive
    // or mutate the run.
    let state = frame(state, progress(50, 100, 50.0));
    assert_eq!(state.run().processed, 0);
    assert_eq!(state.status(), TaskStatus::Stopped);

    let state = frame(state, complete(100, Some("late")));
    assert_eq!(state.status(), TaskStatus::Stopped);
    assert_eq!(state.run().session_id, None);
}

#[test]
fn full_run_reaches_the_expected_final_state() {
    init_logging();
    let mut config = TaskConfig::for_range(t("2024-05-01T00:00"), t("2024-05-08T00:00"));
    config.enable_tags = false;
    let (state, effects) = update(MonitorState::new(), Msg::StartTask(config.clone()));
    // The partial module selection reaches the wire config untouched.
    assert_eq!(effects, vec![Effect::OpenStream { config }]);
    let state = frame(
        state,
        StreamEvent::Start {
            message: "task accepted".into(),
        },
    );
    let state = frame(state, progress(5, 100, 5.0));
    let state = frame(state, progress(100, 100, 100.0));
    let state = frame(state, complete(100, Some("abc123")));

    let run = state.run();
    assert_eq!(run.status, TaskStatus::Completed);
    assert_eq!(run.processed, 100);
    assert_eq!(run.total, 100);
    assert_eq!(run.session_id.as_deref(), Some("abc123"));

    // starting + backend start + completion note; progress stays out.
    let levels: Vec<LogLevel> = state.log().iter().map(|entry| entry.level).collect();
    assert_eq!(
        levels,
        vec![LogLevel::Info, LogLevel::Info, LogLevel::Success]
    );
}

#[test]
fn remaining_time_is_unknown_before_the_first_progress() {
    init_logging();
    let state = running_state();
    let view = state.view(Instant::now());

    assert_eq!(view.remaining, None);
    assert_eq!(monitor_core::format_remaining(view.remaining), "—");
}
