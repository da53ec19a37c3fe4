//! ElevenLabs text-to-speech.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use mgen_models::{ContentRef, SpeechRequest, SpeechResult, VoiceGender};

use crate::config::{ApiEndpoint, ProviderConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, require_key, send_error};
use crate::traits::{Provider, SpeechProvider};

pub const NAME: &str = "elevenlabs";
pub const MODEL_ID: &str = "eleven_multilingual_v2";
pub const FEMALE_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
pub const MALE_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";
/// Cost per 1000 characters.
pub const COST_PER_1K_CHARS: f64 = 0.30;

/// Voice used for a narrator gender.
pub fn voice_id(gender: VoiceGender) -> &'static str {
    match gender {
        VoiceGender::Female => FEMALE_VOICE_ID,
        VoiceGender::Male => MALE_VOICE_ID,
    }
}

/// Estimated cost of synthesizing `text`.
pub fn estimate_cost(text: &str) -> f64 {
    text.chars().count() as f64 / 1000.0 * COST_PER_1K_CHARS
}

/// ElevenLabs REST client.
pub struct ElevenLabsClient {
    http: Client,
    endpoint: ApiEndpoint,
    timeout: Duration,
}

impl ElevenLabsClient {
    pub fn new(endpoint: ApiEndpoint, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint,
            timeout,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::new(config.elevenlabs.clone(), config.request_timeout)
    }
}

impl Provider for ElevenLabsClient {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsClient {
    async fn generate(&self, request: &SpeechRequest) -> ProviderResult<SpeechResult> {
        let key = require_key(&self.endpoint.api_key, NAME)?;
        if request.text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("empty narration text".into()));
        }
        let started = Instant::now();

        let settings = request.emotion.voice_settings();
        let body = json!({
            "text": request.text,
            "model_id": MODEL_ID,
            "voice_settings": {
                "stability": settings.stability,
                "similarity_boost": settings.similarity_boost,
            }
        });

        let response = self
            .http
            .post(
                self.endpoint
                    .url(&format!("/v1/text-to-speech/{}", voice_id(request.gender))),
            )
            .header("xi-api-key", key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let audio = check_status(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::invalid_response("empty audio payload"));
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(provider = NAME, elapsed_ms, chars = request.text.chars().count(), "Speech generated");

        Ok(SpeechResult {
            content: ContentRef::bytes(audio.to_vec(), "audio/mpeg"),
            provider: NAME.to_string(),
            cost: estimate_cost(&request.text),
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_per_thousand_chars() {
        assert!((estimate_cost(&"a".repeat(1000)) - 0.30).abs() < 1e-9);
        assert!((estimate_cost(&"a".repeat(250)) - 0.075).abs() < 1e-9);
    }

    #[test]
    fn test_voice_selection() {
        assert_eq!(voice_id(VoiceGender::Male), MALE_VOICE_ID);
        assert_eq!(voice_id(VoiceGender::Female), FEMALE_VOICE_ID);
    }
}
