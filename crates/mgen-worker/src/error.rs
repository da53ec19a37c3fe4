//! Pipeline error types.

use mgen_models::JobStage;
use mgen_providers::InvokeError;
use mgen_store::StoreError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every provider failed and the last failure was transient.
    #[error("{capability} providers unavailable: {message}")]
    RetryableProvider {
        capability: &'static str,
        message: String,
    },

    /// A provider rejected the work outright, or none was configured.
    #[error("{capability} failed: {message}")]
    FatalProvider {
        capability: &'static str,
        message: String,
    },

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("{stage} item {index} of {total} failed: {message}")]
    StageJoin {
        stage: JobStage,
        index: usize,
        total: usize,
        message: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact storage failed: {0}")]
    Sink(String),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether resubmitting the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RetryableProvider { .. }
                | PipelineError::Timeout(_)
                | PipelineError::Store(_)
        )
    }
}

impl From<InvokeError> for PipelineError {
    fn from(err: InvokeError) -> Self {
        let message = err.to_string();
        match &err {
            InvokeError::NoProviders(capability) => PipelineError::FatalProvider {
                capability,
                message,
            },
            InvokeError::Exhausted { capability, .. } if err.is_retryable() => {
                PipelineError::RetryableProvider {
                    capability,
                    message,
                }
            }
            InvokeError::Exhausted { capability, .. } => PipelineError::FatalProvider {
                capability,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgen_providers::{ProviderError, ProviderFailure};

    #[test]
    fn test_invoke_error_classification() {
        let transient = InvokeError::Exhausted {
            capability: "image",
            failures: vec![ProviderFailure {
                provider: "replicate".into(),
                error: ProviderError::RateLimited("slow down".into()),
                attempts: 4,
            }],
        };
        let err = PipelineError::from(transient);
        assert!(matches!(err, PipelineError::RetryableProvider { capability: "image", .. }));
        assert!(err.is_retryable());

        let err = PipelineError::from(InvokeError::NoProviders("speech"));
        assert!(matches!(err, PipelineError::FatalProvider { capability: "speech", .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_stage_join_message() {
        let err = PipelineError::StageJoin {
            stage: JobStage::GeneratingImages,
            index: 2,
            total: 3,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "generating_images item 2 of 3 failed: boom");
        assert_eq!(PipelineError::Cancelled.to_string(), "cancelled");
    }
}
