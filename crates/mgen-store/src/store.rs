//! Job state store interface.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};

use mgen_models::{CostEntry, JobError, JobEvent, JobId, JobResult, JobSnapshot, JobStage, Mutation};

use crate::error::StoreResult;

/// Default snapshot time-to-live in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Events for one job, in publication order.
pub type EventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Source of truth for job progress and outcome.
///
/// Every accepted mutation refreshes the TTL and publishes one event.
/// Mutations of unknown jobs fail with `NotFound`; mutations rejected by
/// the snapshot rules return the [`Mutation`] outcome without error.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    /// Store a fresh pending snapshot.
    async fn create(&self, job_id: &JobId) -> StoreResult<JobSnapshot>;

    async fn set_progress(
        &self,
        job_id: &JobId,
        stage: JobStage,
        percent: u8,
        data: Option<Map<String, Value>>,
    ) -> StoreResult<Mutation>;

    async fn complete(
        &self,
        job_id: &JobId,
        result: JobResult,
        costs: Vec<CostEntry>,
    ) -> StoreResult<Mutation>;

    async fn fail(&self, job_id: &JobId, error: JobError, costs: Vec<CostEntry>)
        -> StoreResult<Mutation>;

    /// Current snapshot, `None` when unknown or expired.
    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobSnapshot>>;

    /// Publish a log line without changing the snapshot.
    async fn log(&self, job_id: &JobId, message: &str) -> StoreResult<()>;

    /// Live events for `job_id`, starting after the call.
    async fn subscribe(&self, job_id: &JobId) -> StoreResult<EventStream>;

    /// Connectivity check.
    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
