//! Provider error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors returned by external providers.
///
/// Each variant is either retryable (transient) or fatal for the provider
/// that produced it; see [`ProviderError::is_retryable`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    Unconfigured(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ProviderError {
    /// Classify a non-success HTTP response.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            400 | 404 | 422 => Self::BadRequest(body),
            401 | 403 => Self::Unauthorized(body),
            429 => Self::RateLimited(body),
            500..=599 => Self::Server {
                status,
                message: body,
            },
            _ => Self::InvalidResponse(format!("unexpected status {}: {}", status, body)),
        }
    }

    pub fn unconfigured(provider: impl Into<String>) -> Self {
        Self::Unconfigured(provider.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth another attempt on the same provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited(_)
            | ProviderError::Server { .. }
            | ProviderError::Timeout(_)
            | ProviderError::GenerationFailed(_) => true,
            ProviderError::Network(e) => !e.is_builder() && !e.is_decode(),
            _ => false,
        }
    }

    /// The request itself is unusable, so no other provider is tried.
    pub fn ends_chain(&self) -> bool {
        matches!(self, ProviderError::InvalidInput(_))
    }

    /// Short machine-readable kind for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unconfigured(_) => "unconfigured",
            ProviderError::BadRequest(_) => "bad_request",
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Server { .. } => "server",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Network(_) => "network",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::Json(_) => "json",
            ProviderError::GenerationFailed(_) => "generation_failed",
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::InvalidInput(_) => "invalid_input",
        }
    }
}
