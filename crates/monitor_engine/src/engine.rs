use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use chrono::NaiveDateTime;
use monitor_logging::monitor_info;
use tokio_util::sync::CancellationToken;

use monitor_core::TaskConfig;

use crate::client::{Backend, ChannelEventSink, ClientSettings, HttpBackend};
use crate::export::{ExportError, ExportWriter};
use crate::types::{BackendError, CloseReason, EngineEvent};

/// Engine construction parameters. The filename timestamp is injected so
/// the engine stays clock-format agnostic.
pub struct EngineConfig {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub settings: ClientSettings,
    pub timestamp: Arc<dyn Fn() -> String + Send + Sync>,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            output_dir: output_dir.into(),
            settings: ClientSettings::default(),
            timestamp: Arc::new(default_timestamp),
        }
    }
}

/// Seconds since the epoch; the app injects a calendar formatter instead.
fn default_timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

enum EngineCommand {
    StartRun {
        config: TaskConfig,
    },
    CancelRun,
    QueryTimeRange,
    QueryDataCount {
        time_field: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Export {
        session_id: String,
    },
}

/// Owns the engine thread and its tokio runtime; commands go in through
/// plain channels and events come back the same way, so the front-end
/// loop never blocks on IO.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, BackendError> {
        let backend = Arc::new(HttpBackend::new(&config.base_url, config.settings.clone())?);
        let exporter = Arc::new(ExportWriter::new(config.output_dir, config.timestamp));
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            // Token of the in-flight run, if any.
            let mut active: Option<CancellationToken> = None;
            while let Ok(command) = cmd_rx.recv() {
                handle_command(&runtime, &backend, &exporter, &event_tx, &mut active, command);
            }
        });

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn start_run(&self, config: TaskConfig) {
        let _ = self.cmd_tx.send(EngineCommand::StartRun { config });
    }

    pub fn cancel_run(&self) {
        let _ = self.cmd_tx.send(EngineCommand::CancelRun);
    }

    pub fn query_time_range(&self) {
        let _ = self.cmd_tx.send(EngineCommand::QueryTimeRange);
    }

    pub fn query_data_count(
        &self,
        time_field: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) {
        let _ = self.cmd_tx.send(EngineCommand::QueryDataCount {
            time_field: time_field.into(),
            start,
            end,
        });
    }

    pub fn export(&self, session_id: impl Into<String>) {
        let _ = self.cmd_tx.send(EngineCommand::Export {
            session_id: session_id.into(),
        });
    }

    /// Non-blocking poll used by the front-end dispatch loop.
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }
}

fn handle_command(
    runtime: &tokio::runtime::Runtime,
    backend: &Arc<HttpBackend>,
    exporter: &Arc<ExportWriter>,
    event_tx: &mpsc::Sender<EngineEvent>,
    active: &mut Option<CancellationToken>,
    command: EngineCommand,
) {
    match command {
        EngineCommand::StartRun { config } => {
            let token = CancellationToken::new();
            // A newer run supersedes whatever is still in flight.
            if let Some(old) = active.replace(token.clone()) {
                old.cancel();
            }
            let backend = backend.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let sink = ChannelEventSink::new(event_tx.clone());
                let reason = match backend.run_task(&config, &sink, &token).await {
                    Ok(stats) if stats.cancelled => {
                        monitor_info!("run cancelled after {} frames", stats.frames);
                        CloseReason::Cancelled
                    }
                    Ok(stats) => {
                        monitor_info!(
                            "stream closed: {} frames, {} skipped",
                            stats.frames,
                            stats.skipped
                        );
                        CloseReason::Ended
                    }
                    Err(err) => CloseReason::Failed(err),
                };
                let _ = event_tx.send(EngineEvent::Closed { reason });
            });
        }
        EngineCommand::CancelRun => {
            if let Some(token) = active.take() {
                token.cancel();
            }
        }
        EngineCommand::QueryTimeRange => {
            let backend = backend.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let result = backend.time_range().await;
                let _ = event_tx.send(EngineEvent::TimeRangeResolved { result });
            });
        }
        EngineCommand::QueryDataCount {
            time_field,
            start,
            end,
        } => {
            let backend = backend.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let result = backend.data_count(&time_field, start, end).await;
                let _ = event_tx.send(EngineEvent::DataCountResolved { result });
            });
        }
        EngineCommand::Export { session_id } => {
            let backend = backend.clone();
            let exporter = exporter.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let result = match backend.export_deduplicated(&session_id).await {
                    Ok(payload) => exporter.write(&payload).map_err(ExportError::from),
                    Err(err) => Err(ExportError::from(err)),
                };
                let _ = event_tx.send(EngineEvent::ExportFinished { result });
            });
        }
    }
}
