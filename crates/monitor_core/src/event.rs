use serde::{Deserialize, Serialize};

/// One decoded frame of the batch-parse stream.
///
/// The wire form is a JSON object with a `type` discriminator, one frame
/// per `data:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend accepted the run and started working.
    Start { message: String },
    /// Counter update. `percentage` is server-computed and shown verbatim.
    Progress {
        current: u64,
        total: u64,
        percentage: f64,
    },
    /// Informational note about the item currently being processed.
    Log { message: String },
    /// Per-item degradation; the item still counts as processed.
    Warning { message: String },
    /// Fatal backend failure announced in-band. The stream ends after it.
    Error { message: String },
    /// Terminal success frame. The zero-data variant omits everything but
    /// `total_processed` and `message`.
    Complete {
        total_processed: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success_count: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_count: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StreamEvent {
    /// True for frames after which the backend sends nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}
