use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

use monitor_core::StreamEvent;

use crate::export::ExportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("http status {status}")]
    HttpStatus { status: u16 },
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("stream idle for more than {limit:?}")]
    IdleTimeout { limit: Duration },
    #[error("unreadable backend response: {0}")]
    Decode(String),
    #[error("backend rejected the request: {message}")]
    Rejected { message: String },
}

/// Summary of one driven stream, reported alongside `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Frames decoded and forwarded.
    pub frames: u64,
    /// Malformed lines dropped after logging.
    pub skipped: u64,
    /// Whether a terminal frame (complete or in-band error) arrived.
    pub saw_terminal: bool,
    /// Whether the run was torn down by cancellation.
    pub cancelled: bool,
}

#[derive(Debug)]
pub enum CloseReason {
    /// The server closed the stream, with or without a terminal frame.
    Ended,
    /// The local cancellation token tore the stream down.
    Cancelled,
    /// Transport or HTTP failure; the run cannot continue.
    Failed(BackendError),
}

#[derive(Debug)]
pub enum EngineEvent {
    /// One decoded frame from the active run.
    Frame(StreamEvent),
    /// The active run's stream is finished, one way or another.
    Closed { reason: CloseReason },
    /// Answer to a time-range query; `None` means an empty database.
    TimeRangeResolved {
        result: Result<Option<(NaiveDateTime, NaiveDateTime)>, BackendError>,
    },
    /// Answer to a row-count preview query.
    DataCountResolved { result: Result<u64, BackendError> },
    /// Outcome of an export download, with the written path on success.
    ExportFinished { result: Result<PathBuf, ExportError> },
}
