//! Per-process set of provider chains.

use std::sync::Arc;

use tracing::info;

use mgen_models::Capability;

use crate::config::ProviderConfig;
use crate::elevenlabs::ElevenLabsClient;
use crate::error::ProviderResult;
use crate::hosted::HostedVideoClient;
use crate::inline::InlineAnalyzer;
use crate::openai::OpenAiAnalyzer;
use crate::replicate::ReplicateClient;
use crate::retry::{FallbackChain, RetryPolicy};
use crate::stability::StabilityClient;
use crate::traits::{CompositionProvider, ContentAnalyzer, ImageProvider, Provider, SpeechProvider};

/// Provider chains for every capability, built once at startup.
pub struct ProviderRegistry {
    pub images: FallbackChain<dyn ImageProvider>,
    pub speech: FallbackChain<dyn SpeechProvider>,
    pub analysis: FallbackChain<dyn ContentAnalyzer>,
    /// Hosted composition fallbacks, tried after local rendering
    pub hosted_video: Vec<Arc<dyn CompositionProvider>>,
}

impl ProviderRegistry {
    pub fn new(
        images: Vec<Arc<dyn ImageProvider>>,
        speech: Vec<Arc<dyn SpeechProvider>>,
        analysis: Vec<Arc<dyn ContentAnalyzer>>,
        hosted_video: Vec<Arc<dyn CompositionProvider>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            images: FallbackChain::new(Capability::Image, images, policy.clone()),
            speech: FallbackChain::new(Capability::Speech, speech, policy.clone()),
            analysis: FallbackChain::new(Capability::Analysis, analysis, policy),
            hosted_video,
        }
    }

    /// Default chains: Replicate then Stability, ElevenLabs, OpenAI then
    /// inline, Runway then Pika.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let images: Vec<Arc<dyn ImageProvider>> = vec![
            Arc::new(ReplicateClient::from_config(config)?),
            Arc::new(StabilityClient::from_config(config)?),
        ];
        let speech: Vec<Arc<dyn SpeechProvider>> =
            vec![Arc::new(ElevenLabsClient::from_config(config)?)];
        let analysis: Vec<Arc<dyn ContentAnalyzer>> = vec![
            Arc::new(OpenAiAnalyzer::from_config(config)?),
            Arc::new(InlineAnalyzer),
        ];
        let hosted_video: Vec<Arc<dyn CompositionProvider>> = vec![
            Arc::new(HostedVideoClient::runway(config)?),
            Arc::new(HostedVideoClient::pika(config)?),
        ];

        let registry = Self::new(images, speech, analysis, hosted_video, config.retry.clone());
        registry.log_summary();
        Ok(registry)
    }

    /// (capability, provider, configured) for every registered provider.
    pub fn summary(&self) -> Vec<(&'static str, String, bool)> {
        fn rows<P: Provider + ?Sized>(
            capability: &'static str,
            providers: &[Arc<P>],
        ) -> Vec<(&'static str, String, bool)> {
            providers
                .iter()
                .map(|p| (capability, p.name().to_string(), p.is_configured()))
                .collect()
        }

        let mut out = rows("image", self.images.providers());
        out.extend(rows("speech", self.speech.providers()));
        out.extend(rows("analysis", self.analysis.providers()));
        out.extend(rows("composition", &self.hosted_video));
        out
    }

    fn log_summary(&self) {
        for (capability, provider, configured) in self.summary() {
            info!(capability, provider = %provider, configured, "Provider registered");
        }
    }
}
