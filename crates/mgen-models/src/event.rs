//! Job progress events.
//!
//! Published on every accepted state change and streamed to WebSocket
//! subscribers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::{JobId, JobStage};
use crate::job_state::{JobResult, JobSnapshot};

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Stage/progress update (0-100)
    Progress {
        stage: JobStage,
        value: u8,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        data: Map<String, Value>,
    },

    /// Log message with timestamp
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job completed
    Completed { result: JobResult },

    /// Job failed
    Failed {
        message: String,
        stage: JobStage,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn progress(stage: JobStage, value: u8) -> Self {
        Self::Progress {
            stage,
            value: value.min(100),
            data: Map::new(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>, stage: JobStage) -> Self {
        Self::Failed {
            message: message.into(),
            stage,
            timestamp: Utc::now(),
        }
    }

    /// Event describing the current state of a snapshot.
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        if let Some(result) = &snapshot.result {
            return Self::Completed {
                result: result.clone(),
            };
        }
        if let Some(error) = &snapshot.error {
            return Self::Failed {
                message: error.message.clone(),
                stage: error.stage,
                timestamp: snapshot.updated_at,
            };
        }
        Self::Progress {
            stage: snapshot.stage,
            value: snapshot.progress,
            data: snapshot.data.clone(),
        }
    }

    /// No further events follow a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

/// Event addressed to a job, as carried on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobEventEnvelope {
    pub job_id: JobId,
    pub seq: u64,
    pub event: JobEvent,
}
