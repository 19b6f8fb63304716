/// IO requested by `update`, executed by the engine layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the streaming batch-parse request for this run.
    OpenStream { config: crate::TaskConfig },
    /// Tear down the in-flight stream.
    CancelStream,
    /// Download the deduplicated results of the completed run.
    ExportResults { session_id: String },
}
