//! Monitor engine: IO pipeline and effect execution.
mod client;
mod engine;
mod export;
mod frame;
mod persist;
mod types;

pub use client::{
    parse_backend_time, Backend, ChannelEventSink, ClientSettings, EventSink, HttpBackend,
};
pub use engine::{EngineConfig, EngineHandle};
pub use export::{ExportError, ExportWriter};
pub use frame::{FrameDecoder, FrameError};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use types::{BackendError, CloseReason, EngineEvent, StreamStats};
