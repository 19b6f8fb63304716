#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted a task configuration for execution.
    StartTask(crate::TaskConfig),
    /// User asked to stop the active run.
    StopTask,
    /// User asked to clear a finished run back to idle.
    ResetTask,
    /// User asked to download the completed run's deduplicated results.
    ExportRequested,
    /// Decoded frame delivered by the stream engine.
    Frame(crate::StreamEvent),
    /// The stream closed without a transport error.
    StreamEnded,
    /// The stream or the initial request failed; the run cannot continue.
    StreamFailed { message: String },
}
