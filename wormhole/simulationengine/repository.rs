use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::ShaftConfig, progress::ProgressListener, runtime::RunOptions,
    state::SimulationResult,
};

/// Seam between hosts and whatever executes a shaft simulation.
#[async_trait]
pub trait SimulationRepository: Send + Sync {
    /// Registers the listener used by subsequent runs, replacing the old one.
    fn set_progress_listener(&self, listener: Arc<dyn ProgressListener>);

    /// Runs `config` under `options` until it terminates.
    async fn simulate_with(&self, config: ShaftConfig, options: RunOptions) -> SimulationResult;

    /// Runs `config` with default options.
    async fn simulate(&self, config: ShaftConfig) -> SimulationResult {
        self.simulate_with(config, RunOptions::default()).await
    }
}
