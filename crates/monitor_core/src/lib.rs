//! Monitor core: pure state machine and view-model helpers.
mod config;
mod effect;
mod event;
mod msg;
mod state;
mod timing;
mod update;
mod view_model;

pub use config::{ConfigError, TaskConfig, DEFAULT_DATA_SOURCE, TIME_FORMAT};
pub use effect::Effect;
pub use event::StreamEvent;
pub use msg::Msg;
pub use state::{LogEntry, LogLevel, MonitorState, TaskRun, TaskStatus};
pub use timing::{
    estimate_remaining, format_duration, format_remaining, success_rate, UNKNOWN_REMAINING,
};
pub use update::update;
pub use view_model::TaskViewModel;
