//! Media generation pipeline.
//!
//! This crate provides:
//! - The staged pipeline orchestrator with progress reporting
//! - Composition with local FFmpeg and hosted fallback
//! - Per-job cost accounting
//! - Artifact storage
//! - A job executor with concurrency limits, cancellation and graceful shutdown

pub mod compositor;
pub mod config;
pub mod cost;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod sink;

pub use compositor::{Compositor, FfmpegCompositor, LOCAL_PROVIDER};
pub use config::WorkerConfig;
pub use cost::CostLedger;
pub use error::{PipelineError, PipelineResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::Pipeline;
pub use sink::{artifact_key, ArtifactSink, LocalArtifactSink};
