use std::sync::Arc;

use cutout_core::{ArtifactStore, Config, JobScheduler, UploadConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    scheduler: Arc<JobScheduler>,
    store: Arc<dyn ArtifactStore>,
}

impl AppState {
    pub fn new(config: Config, scheduler: Arc<JobScheduler>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            scheduler,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn upload(&self) -> &UploadConfig {
        &self.config.upload
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Store that persisted uploads live in. Rejected uploads are released here.
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }
}
