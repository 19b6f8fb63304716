use monitor_core::Effect;
use monitor_engine::{EngineEvent, EngineHandle};
use monitor_logging::monitor_info;

use crate::render;

/// Bridges `update`'s effect commands onto the engine thread.
pub(crate) struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub(crate) fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Direct access for the preflight queries, which run before any
    /// state-machine effect exists.
    pub(crate) fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Non-blocking poll used by the dispatch loop.
    pub(crate) fn poll_event(&self) -> Option<EngineEvent> {
        self.engine.try_recv()
    }

    pub(crate) fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenStream { config } => {
                    monitor_info!(
                        "OpenStream source={} window={}",
                        config.data_source,
                        render::format_window(config.start_time, config.end_time)
                    );
                    self.engine.start_run(config);
                }
                Effect::CancelStream => {
                    monitor_info!("CancelStream");
                    self.engine.cancel_run();
                }
                Effect::ExportResults { session_id } => {
                    monitor_info!("ExportResults session={}", session_id);
                    self.engine.export(session_id);
                }
            }
        }
    }
}
