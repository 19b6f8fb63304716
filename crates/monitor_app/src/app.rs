//! Dispatch loop wiring the pure core to the engine thread.
//!
//! Engine events become messages, `update` folds them into state, and the
//! returned effects go straight back to the engine. Rendering happens only
//! when the state marks itself dirty.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Utc};
use monitor_core::{
    format_duration, update, Effect, MonitorState, Msg, TaskConfig, TaskStatus, TIME_FORMAT,
};
use monitor_engine::{CloseReason, EngineConfig, EngineEvent, EngineHandle};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};

use crate::cli::{Cli, Command, ExportArgs, RunArgs};
use crate::effects::EffectRunner;
use crate::persistence::{self, RunRecord};
use crate::render;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Minimum gap between two printed progress lines.
const PROGRESS_EVERY: Duration = Duration::from_millis(500);
/// How long a preflight query may take before the fallback window is used.
const PREFLIGHT_DEADLINE: Duration = Duration::from_secs(15);
const EXPORT_DEADLINE: Duration = Duration::from_secs(120);

pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        base_url,
        output_dir,
        command,
        ..
    } = cli;
    match command {
        Command::Run(args) => run_task(&base_url, &output_dir, args),
        Command::Export(args) => export_results(&base_url, &output_dir, args),
    }
}

fn build_engine(
    base_url: &str,
    output_dir: &Path,
    idle_timeout_secs: Option<u64>,
) -> Result<EngineHandle> {
    let mut config = EngineConfig::new(base_url, output_dir);
    config.timestamp = Arc::new(export_stamp);
    if let Some(secs) = idle_timeout_secs {
        config.settings.idle_timeout = Duration::from_secs(secs);
    }
    EngineHandle::new(config).context("failed to set up the backend client")
}

/// Calendar stamp for export filenames; colons would not survive every
/// filesystem.
fn export_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string()
}

fn run_task(base_url: &str, output_dir: &Path, args: RunArgs) -> Result<ExitCode> {
    let engine = build_engine(base_url, output_dir, args.idle_timeout_secs)?;
    let runner = EffectRunner::new(engine);

    let (start, end) = resolve_window(&runner, &args);
    let mut config = TaskConfig::for_range(start, end);
    config.data_source = args.data_source.clone();
    config.enable_sentiment = !args.no_sentiment;
    config.enable_tags = !args.no_tags;
    config.enable_companies = !args.no_companies;
    if let Err(err) = config.validate() {
        eprintln!("error: {err}");
        // Same code clap uses for usage errors.
        return Ok(ExitCode::from(2));
    }

    preview_data_count(&runner, &args.time_field, start, end);

    let (msg_tx, msg_rx) = mpsc::channel();
    spawn_interrupt_watcher(msg_tx);

    println!(
        "starting batch parse over {}",
        render::format_window(start, end)
    );
    let mut state = dispatch(MonitorState::new(), Msg::StartTask(config.clone()), &runner);
    debug_assert_eq!(state.status(), TaskStatus::Running);
    state = drive(state, &runner, &msg_rx);

    finish_run(state, &runner, &config, args.export, output_dir)
}

/// Polls interrupts and engine events until the run is terminal and its
/// stream has closed.
fn drive(
    mut state: MonitorState,
    runner: &EffectRunner,
    interrupts: &mpsc::Receiver<Msg>,
) -> MonitorState {
    let mut printed_logs = 0;
    let mut last_progress = Instant::now();
    let mut closed = false;

    loop {
        let mut inbox: Vec<Msg> = Vec::new();
        while let Ok(msg) = interrupts.try_recv() {
            inbox.push(msg);
        }
        while let Some(event) = runner.poll_event() {
            match event {
                EngineEvent::Frame(frame) => inbox.push(Msg::Frame(frame)),
                EngineEvent::Closed { reason } => {
                    closed = true;
                    match reason {
                        CloseReason::Ended => inbox.push(Msg::StreamEnded),
                        // The close the user's stop asked for; state is
                        // already Stopped.
                        CloseReason::Cancelled => monitor_debug!("stream closed after cancel"),
                        CloseReason::Failed(err) => inbox.push(Msg::StreamFailed {
                            message: err.to_string(),
                        }),
                    }
                }
                other => monitor_debug!("event outside the run protocol: {:?}", other),
            }
        }
        for msg in inbox {
            state = dispatch(state, msg, runner);
        }

        if state.consume_dirty() {
            flush_output(&state, &mut printed_logs, &mut last_progress);
        }

        if state.status().is_terminal() && closed {
            return state;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn dispatch(state: MonitorState, msg: Msg, runner: &EffectRunner) -> MonitorState {
    let (state, effects) = update(state, msg);
    runner.enqueue(effects);
    state
}

/// Prints run-log entries past the watermark, plus a throttled progress line.
fn flush_output(state: &MonitorState, printed_logs: &mut usize, last_progress: &mut Instant) {
    for entry in &state.log()[*printed_logs..] {
        println!("{}", render::log_line(entry));
    }
    *printed_logs = state.log().len();

    if state.status() == TaskStatus::Running && last_progress.elapsed() >= PROGRESS_EVERY {
        let view = state.view(Instant::now());
        if view.total > 0 {
            println!("{}", render::progress_line(&view));
            *last_progress = Instant::now();
        }
    }
}

fn finish_run(
    state: MonitorState,
    runner: &EffectRunner,
    config: &TaskConfig,
    export: bool,
    output_dir: &Path,
) -> Result<ExitCode> {
    let view = state.view(Instant::now());
    println!("{}", render::summary_line(&view));

    match view.status {
        TaskStatus::Completed => {
            match view.session_id.clone() {
                Some(session_id) => persistence::save_last_run(
                    output_dir,
                    &RunRecord {
                        session_id,
                        completed_at: Utc::now().to_rfc3339(),
                        data_source: config.data_source.clone(),
                        start_time: config.start_time.format(TIME_FORMAT).to_string(),
                        end_time: config.end_time.format(TIME_FORMAT).to_string(),
                        total_processed: view.processed,
                        error_count: view.error_count,
                    },
                ),
                None => monitor_debug!("no session id to record for this run"),
            }
            if export {
                if view.session_id.is_some() {
                    let _ = dispatch(state, Msg::ExportRequested, runner);
                    match await_export(runner) {
                        Ok(path) => println!("wrote {}", path.display()),
                        Err(message) => {
                            eprintln!("error: export failed: {message}");
                            return Ok(ExitCode::FAILURE);
                        }
                    }
                } else {
                    println!("[warn] nothing to export: the run recorded no session id");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        TaskStatus::Stopped => Ok(ExitCode::from(2)),
        _ => Ok(ExitCode::FAILURE),
    }
}

fn export_results(base_url: &str, output_dir: &Path, args: ExportArgs) -> Result<ExitCode> {
    let recorded = || persistence::load_last_run(output_dir).map(|record| record.session_id);
    let session_id = match args.session.or_else(recorded) {
        Some(session_id) => session_id,
        None => {
            eprintln!(
                "error: no session id given and no recorded run under {}",
                output_dir.display()
            );
            return Ok(ExitCode::from(2));
        }
    };

    let engine = build_engine(base_url, output_dir, None)?;
    let runner = EffectRunner::new(engine);
    println!("exporting deduplicated results for session {session_id}");
    runner.enqueue(vec![Effect::ExportResults { session_id }]);

    match await_export(&runner) {
        Ok(path) => {
            println!("wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(message) => {
            eprintln!("error: export failed: {message}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolves the task window: explicit bounds win, then the database's own
/// range, then the last seven days.
fn resolve_window(runner: &EffectRunner, args: &RunArgs) -> (NaiveDateTime, NaiveDateTime) {
    if let (Some(start), Some(end)) = (args.start, args.end) {
        return (start, end);
    }

    runner.engine().query_time_range();
    let outcome = await_event(runner, PREFLIGHT_DEADLINE, |event| match event {
        EngineEvent::TimeRangeResolved { result } => Some(result),
        other => {
            monitor_debug!("event while resolving the window: {:?}", other);
            None
        }
    });
    let resolved = match outcome {
        Some(Ok(Some((earliest, latest)))) => {
            monitor_info!(
                "database range {}",
                render::format_window(earliest, latest)
            );
            (earliest, latest)
        }
        Some(Ok(None)) => {
            monitor_warn!("the database reports no records; using the last seven days");
            default_window()
        }
        Some(Err(err)) => {
            monitor_warn!("time-range query failed ({err}); using the last seven days");
            default_window()
        }
        None => {
            monitor_warn!("time-range query timed out; using the last seven days");
            default_window()
        }
    };

    (
        args.start.unwrap_or(resolved.0),
        args.end.unwrap_or(resolved.1),
    )
}

fn default_window() -> (NaiveDateTime, NaiveDateTime) {
    let now = Local::now().naive_local();
    (now - chrono::Duration::days(7), now)
}

/// Best-effort row-count preview for the chosen window.
fn preview_data_count(
    runner: &EffectRunner,
    time_field: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) {
    runner.engine().query_data_count(time_field, start, end);
    let outcome = await_event(runner, PREFLIGHT_DEADLINE, |event| match event {
        EngineEvent::DataCountResolved { result } => Some(result),
        other => {
            monitor_debug!("event while counting records: {:?}", other);
            None
        }
    });
    match outcome {
        Some(Ok(0)) => println!("[warn] no records in the selected window"),
        Some(Ok(total)) => {
            // Rough per-record cost observed on the backend: ~0.1 s.
            let estimate = Duration::from_secs((total as f64 * 0.1).ceil() as u64);
            println!(
                "{total} records in window, estimated processing time {}",
                format_duration(estimate)
            );
        }
        Some(Err(err)) => monitor_warn!("data-count preview failed: {err}"),
        None => monitor_warn!("data-count preview timed out"),
    }
}

fn await_export(runner: &EffectRunner) -> Result<PathBuf, String> {
    let outcome = await_event(runner, EXPORT_DEADLINE, |event| match event {
        EngineEvent::ExportFinished { result } => Some(result),
        other => {
            monitor_debug!("event while waiting for the export: {:?}", other);
            None
        }
    });
    match outcome {
        Some(Ok(path)) => Ok(path),
        Some(Err(err)) => Err(err.to_string()),
        None => Err("the backend did not answer in time".to_owned()),
    }
}

/// Polls the engine until `pick` accepts an event or the deadline passes.
fn await_event<T>(
    runner: &EffectRunner,
    deadline: Duration,
    mut pick: impl FnMut(EngineEvent) -> Option<T>,
) -> Option<T> {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if let Some(event) = runner.poll_event() {
            if let Some(value) = pick(event) {
                return Some(value);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    None
}

/// First Ctrl-C stops the run gracefully; the second one exits hard.
fn spawn_interrupt_watcher(msg_tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                monitor_warn!("Ctrl-C handling unavailable: {err}");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            monitor_info!("interrupt received, stopping the task");
            let _ = msg_tx.send(Msg::StopTask);
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(2);
            }
        });
    });
}
