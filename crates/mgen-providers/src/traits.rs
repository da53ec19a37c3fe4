//! Capability traits implemented by provider clients.

use async_trait::async_trait;

use mgen_models::{
    CompositionRequest, CompositionResult, ImageRequest, ImageResult, SceneBrief, SpeechRequest,
    SpeechResult,
};

use crate::error::ProviderResult;

/// Common provider identity.
pub trait Provider: Send + Sync {
    /// Stable provider name used in logs, metrics and cost entries.
    fn name(&self) -> &str;

    /// Whether the provider has the credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Text-to-image generation.
#[async_trait]
pub trait ImageProvider: Provider {
    async fn generate(&self, request: &ImageRequest) -> ProviderResult<ImageResult>;
}

/// Text-to-speech synthesis.
#[async_trait]
pub trait SpeechProvider: Provider {
    async fn generate(&self, request: &SpeechRequest) -> ProviderResult<SpeechResult>;
}

/// Scene sequence to video.
#[async_trait]
pub trait CompositionProvider: Provider {
    async fn compose(&self, request: &CompositionRequest) -> ProviderResult<CompositionResult>;
}

/// Prompt to scene briefs.
#[async_trait]
pub trait ContentAnalyzer: Provider {
    async fn analyze(&self, prompt: &str, max_scenes: usize) -> ProviderResult<Vec<SceneBrief>>;
}
