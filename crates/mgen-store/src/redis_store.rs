//! Redis-backed job store.
//!
//! Snapshots live under `job:{id}:state` with `SET EX`; events are
//! published on `progress:{id}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mgen_models::{
    CostEntry, JobError, JobEvent, JobEventEnvelope, JobId, JobResult, JobSnapshot, JobStage,
    Mutation,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{EventStream, JobStateStore};

/// Job store on Redis.
pub struct RedisJobStore {
    client: redis::Client,
    ttl: Duration,
    /// Serializes read-modify-write cycles issued by this process
    write_lock: Mutex<()>,
}

impl RedisJobStore {
    /// Create a new store. Connections are opened lazily.
    pub fn new(redis_url: &str, ttl: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            ttl,
            write_lock: Mutex::new(()),
        })
    }

    /// Key holding the snapshot JSON.
    pub fn state_key(job_id: &JobId) -> String {
        format!("job:{}:state", job_id)
    }

    /// Pub/Sub channel for a job's events.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("progress:{}", job_id)
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        job_id: &JobId,
    ) -> StoreResult<Option<JobSnapshot>> {
        let raw: Option<String> = conn.get(Self::state_key(job_id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn save(
        &self,
        conn: &mut MultiplexedConnection,
        snapshot: &JobSnapshot,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        conn.set_ex::<_, _, ()>(Self::state_key(&snapshot.job_id), payload, self.ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        conn: &mut MultiplexedConnection,
        job_id: &JobId,
        seq: u64,
        event: JobEvent,
    ) -> StoreResult<()> {
        let channel = Self::channel_name(job_id);
        let payload = serde_json::to_string(&JobEventEnvelope {
            job_id: job_id.clone(),
            seq,
            event,
        })?;

        debug!("Publishing job event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn mutate<F>(&self, job_id: &JobId, apply: F) -> StoreResult<Mutation>
    where
        F: FnOnce(&mut JobSnapshot) -> Mutation + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.connection().await?;

        let mut snapshot = self
            .load(&mut conn, job_id)
            .await?
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))?;

        let outcome = apply(&mut snapshot);
        if outcome.is_applied() {
            self.save(&mut conn, &snapshot).await?;
            let event = JobEvent::from_snapshot(&snapshot);
            if let Err(e) = self.publish(&mut conn, job_id, snapshot.event_seq, event).await {
                // The snapshot is stored; pollers still see the change.
                warn!(job_id = %job_id, "Failed to publish job event: {}", e);
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl JobStateStore for RedisJobStore {
    async fn create(&self, job_id: &JobId) -> StoreResult<JobSnapshot> {
        let mut conn = self.connection().await?;
        let snapshot = JobSnapshot::new(job_id.clone());
        let payload = serde_json::to_string(&snapshot)?;

        let created: bool = redis::cmd("SET")
            .arg(Self::state_key(job_id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .arg("NX")
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !created {
            return Err(StoreError::AlreadyExists(job_id.to_string()));
        }

        self.publish(&mut conn, job_id, snapshot.event_seq, JobEvent::from_snapshot(&snapshot))
            .await?;
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
        let mut conn = self.connection().await?;
        self.load(&mut conn, job_id).await
    }

    async fn log(&self, job_id: &JobId, message: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        self.publish(&mut conn, job_id, 0, JobEvent::log(message))
            .await
    }

    async fn subscribe(&self, job_id: &JobId) -> StoreResult<EventStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        pubsub.subscribe(Self::channel_name(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str::<JobEventEnvelope>(&payload)
                .ok()
                .map(|envelope| envelope.event)
        });

        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = JobId::from_string("job-00000001");
        assert_eq!(RedisJobStore::state_key(&id), "job:job-00000001:state");
        assert_eq!(RedisJobStore::channel_name(&id), "progress:job-00000001");
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_unavailable() {
        // Nothing listens on port 1.
        let store = RedisJobStore::new("redis://127.0.0.1:1", Duration::from_secs(60)).unwrap();
        let err = store
            .get(&JobId::from_string("job-00000001"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.ping().await.is_err());
    }
}
