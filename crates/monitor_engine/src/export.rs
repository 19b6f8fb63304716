use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};
use crate::types::BackendError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Writes export downloads into the output directory under a timestamped
/// `deduplicated_results_*.json` name.
pub struct ExportWriter {
    writer: AtomicFileWriter,
    timestamp: Arc<dyn Fn() -> String + Send + Sync>,
}

impl ExportWriter {
    pub fn new(output_dir: PathBuf, timestamp: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_dir),
            timestamp,
        }
    }

    pub fn write(&self, payload: &[u8]) -> Result<PathBuf, PersistError> {
        let filename = format!("deduplicated_results_{}.json", (self.timestamp)());
        self.writer.write(&filename, payload)
    }
}
