//! Externally visible job state.
//!
//! A [`JobSnapshot`] is what the state store persists and what pollers see.
//! All mutation goes through methods that keep progress monotonic and make
//! terminal snapshots immutable.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cost::CostEntry;
use crate::job::{JobId, JobStage, JobStatus};

/// Final artifact reference of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Duration in seconds
    pub duration: f64,
    /// Composition provider that produced the video
    pub provider: String,
    /// True when a fallback composition dropped scenes or subtitles
    #[serde(default)]
    pub degraded: bool,
}

/// Error that terminated a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub message: String,
    /// Stage the job was in when it failed
    pub stage: JobStage,
}

impl JobError {
    pub fn new(message: impl Into<String>, stage: JobStage) -> Self {
        Self {
            message: message.into(),
            stage,
        }
    }
}

/// Outcome of applying a mutation to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The snapshot changed
    Applied,
    /// The snapshot is terminal and was left untouched
    Terminal,
    /// The requested stage is behind the current one
    Backward,
}

impl Mutation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Mutation::Applied)
    }
}

/// Snapshot of a job's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub stage: JobStage,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Free-form stage metadata for UIs
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default)]
    pub costs: Vec<CostEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl JobSnapshot {
    /// Create a pending snapshot.
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            stage: JobStage::Pending,
            status: JobStatus::Pending,
            progress: 0,
            data: Map::new(),
            result: None,
            error: None,
            costs: Vec::new(),
            created_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Record stage and progress.
    ///
    /// Progress is clamped to 100 and never decreases. `data`, when given,
    /// replaces the stage metadata.
    pub fn set_progress(
        &mut self,
        stage: JobStage,
        percent: u8,
        data: Option<Map<String, Value>>,
    ) -> Mutation {
        if self.is_terminal() {
            return Mutation::Terminal;
        }
        if stage.is_terminal() || !self.stage.can_advance_to(stage) {
            return Mutation::Backward;
        }

        self.stage = stage;
        self.status = stage.status();
        self.progress = self.progress.max(percent.min(100));
        if let Some(data) = data {
            self.data = data;
        }
        self.touch();
        Mutation::Applied
    }

    /// Mark the job completed with its result.
    pub fn complete(&mut self, result: JobResult, costs: Vec<CostEntry>) -> Mutation {
        if self.is_terminal() {
            return Mutation::Terminal;
        }
        if !self.stage.can_advance_to(JobStage::Completed) {
            return Mutation::Backward;
        }

        self.stage = JobStage::Completed;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.costs = costs;
        self.touch();
        Mutation::Applied
    }

    /// Mark the job failed.
    ///
    /// Progress is left where the job stopped.
    pub fn fail(&mut self, error: JobError, costs: Vec<CostEntry>) -> Mutation {
        if self.is_terminal() {
            return Mutation::Terminal;
        }

        self.stage = JobStage::Failed;
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.costs = costs;
        self.touch();
        Mutation::Applied
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }
}

/// Status reported by a job query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// The state store could not be reached
    StoreUnavailable,
}

impl From<JobStatus> for ViewStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => ViewStatus::Pending,
            JobStatus::Processing => ViewStatus::Processing,
            JobStatus::Completed => ViewStatus::Completed,
            JobStatus::Failed => ViewStatus::Failed,
        }
    }
}

/// Answer to a job status query.
///
/// For failed jobs `stage` is the stage the job failed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobView {
    pub job_id: JobId,
    pub status: ViewStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JobStage>,
    pub progress: u8,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub costs: Vec<CostEntry>,
}

impl From<JobSnapshot> for JobView {
    fn from(snapshot: JobSnapshot) -> Self {
        let stage = snapshot.error.as_ref().map_or(snapshot.stage, |e| e.stage);
        Self {
            job_id: snapshot.job_id,
            status: snapshot.status.into(),
            stage: Some(stage),
            progress: snapshot.progress,
            data: snapshot.data,
            result: snapshot.result,
            error: snapshot.error.map(|e| e.message),
            costs: snapshot.costs,
        }
    }
}
