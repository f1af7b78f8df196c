use std::sync::Arc;
use tubetag_core::{Config, PipelineRunner, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    runner: Arc<PipelineRunner>,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<PipelineRunner>) -> Self {
        Self { config, runner }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.runner
    }

    /// Whether closing a progress socket early cancels its run.
    pub fn cancel_on_disconnect(&self) -> bool {
        self.runner.config().cancel_on_disconnect
    }
}
