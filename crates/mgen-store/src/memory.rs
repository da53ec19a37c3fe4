//! In-process job store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use mgen_models::{
    CostEntry, JobError, JobEvent, JobEventEnvelope, JobId, JobResult, JobSnapshot, JobStage,
    Mutation,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{EventStream, JobStateStore, DEFAULT_TTL_SECS};

const EVENT_CAPACITY: usize = 1024;

struct Entry {
    snapshot: JobSnapshot,
    expires_at: Instant,
}

/// Job store backed by a map, with lazy TTL eviction.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Entry>>,
    events: broadcast::Sender<JobEventEnvelope>,
    ttl: Duration,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl MemoryJobStore {
    pub fn new(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
            ttl,
        }
    }

    fn publish(&self, job_id: &JobId, seq: u64, event: JobEvent) {
        // No receivers is fine.
        let _ = self.events.send(JobEventEnvelope {
            job_id: job_id.clone(),
            seq,
            event,
        });
    }

    async fn mutate<F>(&self, job_id: &JobId, apply: F) -> StoreResult<Mutation>
    where
        F: FnOnce(&mut JobSnapshot) -> Mutation + Send,
    {
        let mut jobs = self.jobs.write().await;
        let now = Instant::now();

        if jobs.get(job_id).is_some_and(|e| e.expires_at <= now) {
            jobs.remove(job_id);
        }
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))?;

        let outcome = apply(&mut entry.snapshot);
        if outcome.is_applied() {
            entry.expires_at = now + self.ttl;
            let event = JobEvent::from_snapshot(&entry.snapshot);
            self.publish(job_id, entry.snapshot.event_seq, event);
        } else {
            debug!(job_id = %job_id, ?outcome, "Mutation ignored");
        }
        Ok(outcome)
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let now = Instant::now();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.expires_at > now);
        before - jobs.len()
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStore {
    async fn create(&self, job_id: &JobId) -> StoreResult<JobSnapshot> {
        let mut jobs = self.jobs.write().await;
        let now = Instant::now();

        if jobs.get(job_id).is_some_and(|e| e.expires_at > now) {
            return Err(StoreError::AlreadyExists(job_id.to_string()));
        }

        let snapshot = JobSnapshot::new(job_id.clone());
        jobs.insert(
            job_id.clone(),
            Entry {
                snapshot: snapshot.clone(),
                expires_at: now + self.ttl,
            },
        );
        self.publish(job_id, snapshot.event_seq, JobEvent::from_snapshot(&snapshot));
        Ok(snapshot)
    }

    async fn set_progress(
        &self,
        job_id: &JobId,
        stage: JobStage,
        percent: u8,
        data: Option<Map<String, Value>>,
    ) -> StoreResult<Mutation> {
        self.mutate(job_id, |s| s.set_progress(stage, percent, data))
            .await
    }

    async fn complete(
        &self,
        job_id: &JobId,
        result: JobResult,
        costs: Vec<CostEntry>,
    ) -> StoreResult<Mutation> {
        self.mutate(job_id, |s| s.complete(result, costs)).await
    }

    async fn fail(
        &self,
        job_id: &JobId,
        error: JobError,
        costs: Vec<CostEntry>,
    ) -> StoreResult<Mutation> {
        self.mutate(job_id, |s| s.fail(error, costs)).await
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobSnapshot>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_id)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.snapshot.clone()))
    }

    async fn log(&self, job_id: &JobId, message: &str) -> StoreResult<()> {
        let seq = self
            .jobs
            .read()
            .await
            .get(job_id)
            .map(|e| e.snapshot.event_seq)
            .unwrap_or_default();
        self.publish(job_id, seq, JobEvent::log(message));
        Ok(())
    }

    async fn subscribe(&self, job_id: &JobId) -> StoreResult<EventStream> {
        let rx = self.events.subscribe();
        let job_id = job_id.clone();

        let events = stream::unfold(rx, move |mut rx| {
            let job_id = job_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(envelope) if envelope.job_id == job_id => {
                            return Some((envelope.event, rx));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(job_id = %job_id, skipped, "Event subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn job() -> JobId {
        JobId::from_string("job-00000001")
    }

    fn result() -> JobResult {
        JobResult {
            video_url: "file:///tmp/v.mp4".into(),
            thumbnail_url: None,
            duration: 10.0,
            provider: "ffmpeg".into(),
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = MemoryJobStore::default();
        store.create(&job()).await.unwrap();

        store
            .set_progress(&job(), JobStage::GeneratingImages, 40, None)
            .await
            .unwrap();
        store
            .set_progress(&job(), JobStage::GeneratingImages, 30, None)
            .await
            .unwrap();
        let outcome = store
            .set_progress(&job(), JobStage::Analyzing, 90, None)
            .await
            .unwrap();

        assert_eq!(outcome, Mutation::Backward);
        let snapshot = store.get(&job()).await.unwrap().unwrap();
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.stage, JobStage::GeneratingImages);
    }

    #[tokio::test]
    async fn test_unknown_job_mutation_is_not_found() {
        let store = MemoryJobStore::default();
        let err = store
            .set_progress(&job(), JobStage::Analyzing, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.get(&job()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryJobStore::default();
        store.create(&job()).await.unwrap();
        assert!(matches!(
            store.create(&job()).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryJobStore::new(Duration::from_secs(60));
        store.create(&job()).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        store
            .set_progress(&job(), JobStage::Analyzing, 5, None)
            .await
            .unwrap();

        // The mutation refreshed the TTL.
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(store.get(&job()).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.get(&job()).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_subscribe_receives_job_events_in_order() {
        let store = MemoryJobStore::default();
        let other = JobId::from_string("job-00000002");
        store.create(&job()).await.unwrap();
        store.create(&other).await.unwrap();

        let mut events = store.subscribe(&job()).await.unwrap();

        store
            .set_progress(&other, JobStage::Analyzing, 5, None)
            .await
            .unwrap();
        store
            .set_progress(&job(), JobStage::Analyzing, 5, None)
            .await
            .unwrap();
        store.log(&job(), "analyzing prompt").await.unwrap();
        store
            .set_progress(&job(), JobStage::Finalizing, 95, None)
            .await
            .unwrap();
        store.complete(&job(), result(), Vec::new()).await.unwrap();

        let first = events.next().await.unwrap();
        assert!(matches!(first, JobEvent::Progress { stage: JobStage::Analyzing, value: 5, .. }));
        assert!(matches!(events.next().await.unwrap(), JobEvent::Log { .. }));
        assert!(matches!(events.next().await.unwrap(), JobEvent::Progress { value: 95, .. }));
        let last = events.next().await.unwrap();
        assert!(last.is_terminal());
    }

    #[tokio::test]
    async fn test_terminal_snapshot_is_final() {
        let store = MemoryJobStore::default();
        store.create(&job()).await.unwrap();
        store
            .fail(&job(), JobError::new("cancelled", JobStage::Pending), Vec::new())
            .await
            .unwrap();

        let late = store
            .set_progress(&job(), JobStage::Composing, 80, None)
            .await
            .unwrap();
        assert_eq!(late, Mutation::Terminal);

        let snapshot = store.get(&job()).await.unwrap().unwrap();
        assert_eq!(snapshot.stage, JobStage::Failed);
        assert_eq!(snapshot.error.unwrap().message, "cancelled");
    }
}
