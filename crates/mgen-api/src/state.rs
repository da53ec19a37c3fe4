//! Application state.

use std::sync::Arc;

use mgen_store::JobStateStore;
use mgen_worker::JobExecutor;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: Arc<JobExecutor>,
    pub store: Arc<dyn JobStateStore>,
}

impl AppState {
    pub fn new(config: ApiConfig, executor: Arc<JobExecutor>) -> Self {
        let store = Arc::clone(executor.pipeline().store());
        Self {
            config,
            executor,
            store,
        }
    }
}
