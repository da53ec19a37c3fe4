//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum provider calls in flight within one stage of a job
    pub max_item_parallel: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Hard wall-clock limit for one local render
    pub render_timeout: Duration,
    /// Retries of a failed local render before falling back
    pub render_retries: u32,
    /// Directory for renders and stored artifacts
    pub output_dir: PathBuf,
    /// Public URL prefix for stored artifacts; `file://` URLs when unset
    pub public_base_url: Option<String>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_item_parallel: 4,
            job_timeout: Duration::from_secs(3600), // 1 hour
            render_timeout: Duration::from_secs(300),
            render_retries: 2,
            output_dir: PathBuf::from("/tmp/mgen"),
            public_base_url: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            max_item_parallel: std::env::var("WORKER_MAX_ITEM_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_item_parallel),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            render_timeout: Duration::from_secs(
                std::env::var("WORKER_RENDER_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            render_retries: std::env::var("WORKER_RENDER_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.render_retries),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
