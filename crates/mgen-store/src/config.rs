//! Store configuration and construction.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryJobStore;
use crate::redis_store::RedisJobStore;
use crate::store::{JobStateStore, DEFAULT_TTL_SECS};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Snapshot time-to-live
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: std::env::var("STORE_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backend),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            ttl: std::env::var("JOB_STATE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
        }
    }

    /// Build the configured store.
    pub fn build(&self) -> StoreResult<Arc<dyn JobStateStore>> {
        if self.ttl.is_zero() {
            return Err(StoreError::unavailable("state TTL must be positive"));
        }

        let store: Arc<dyn JobStateStore> = match self.backend {
            StoreBackend::Memory => Arc::new(MemoryJobStore::new(self.ttl)),
            StoreBackend::Redis => Arc::new(RedisJobStore::new(&self.redis_url, self.ttl)?),
        };
        info!(backend = store.backend(), ttl_secs = self.ttl.as_secs(), "Job state store ready");
        Ok(store)
    }
}
