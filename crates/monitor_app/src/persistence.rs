//! Run-record persistence.
//!
//! The last completed run is kept as a small RON document in the output
//! directory so `monitor export` can find its session id later.

use std::fs;
use std::path::Path;

use monitor_engine::{ensure_output_dir, AtomicFileWriter};
use monitor_logging::{monitor_error, monitor_info, monitor_warn};
use serde::{Deserialize, Serialize};

const STATE_FILENAME: &str = ".monitor_state.ron";

/// Snapshot of the most recent completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RunRecord {
    pub session_id: String,
    /// RFC 3339 wall-clock time the run completed.
    pub completed_at: String,
    pub data_source: String,
    /// Window bounds in the backend wire format.
    pub start_time: String,
    pub end_time: String,
    pub total_processed: u64,
    pub error_count: u64,
}

pub(crate) fn load_last_run(output_dir: &Path) -> Option<RunRecord> {
    let path = output_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return None;
        }
        Err(err) => {
            monitor_warn!("Failed to read run record from {:?}: {}", path, err);
            return None;
        }
    };

    match ron::from_str::<RunRecord>(&content) {
        Ok(record) => {
            monitor_info!("Loaded run record from {:?}", path);
            Some(record)
        }
        Err(err) => {
            monitor_warn!("Failed to parse run record from {:?}: {}", path, err);
            None
        }
    }
}

pub(crate) fn save_last_run(output_dir: &Path, record: &RunRecord) {
    if let Err(err) = ensure_output_dir(output_dir) {
        monitor_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(record, pretty) {
        Ok(text) => text,
        Err(err) => {
            monitor_error!("Failed to serialize run record: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    if let Err(err) = writer.write(STATE_FILENAME, content.as_bytes()) {
        monitor_error!("Failed to write run record to {:?}: {}", output_dir, err);
    }
}
