//! Job identity and lifecycle stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id is safe to use as a store key.
    ///
    /// Accepts ASCII alphanumerics and hyphens, 8 to 64 characters.
    pub fn is_well_formed(&self) -> bool {
        let len = self.0.len();
        (8..=64).contains(&len)
            && self.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage of a job.
///
/// Stages only move forward. `Failed` can be entered from any
/// non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    #[default]
    Pending,
    Analyzing,
    GeneratingImages,
    GeneratingAudio,
    Composing,
    Finalizing,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Pending => "pending",
            JobStage::Analyzing => "analyzing",
            JobStage::GeneratingImages => "generating_images",
            JobStage::GeneratingAudio => "generating_audio",
            JobStage::Composing => "composing",
            JobStage::Finalizing => "finalizing",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    /// Position of the stage in the forward order.
    pub fn ordinal(&self) -> u8 {
        match self {
            JobStage::Pending => 0,
            JobStage::Analyzing => 1,
            JobStage::GeneratingImages => 2,
            JobStage::GeneratingAudio => 3,
            JobStage::Composing => 4,
            JobStage::Finalizing => 5,
            JobStage::Completed => 6,
            JobStage::Failed => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Whether a job sitting in `self` may move to `next`.
    ///
    /// Re-entering the current stage is allowed so that per-item progress
    /// can be written repeatedly.
    pub fn can_advance_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStage::Failed => true,
            JobStage::Completed => matches!(self, JobStage::Finalizing),
            _ => next.ordinal() >= self.ordinal(),
        }
    }

    /// Coarse status reported to pollers.
    pub fn status(&self) -> JobStatus {
        match self {
            JobStage::Pending => JobStatus::Pending,
            JobStage::Completed => JobStatus::Completed,
            JobStage::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
