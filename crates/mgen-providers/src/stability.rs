//! Stability AI text-to-image.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use mgen_models::{ContentRef, ImageRequest, ImageResult};

use crate::config::{ApiEndpoint, ProviderConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, require_key, send_error};
use crate::traits::{ImageProvider, Provider};

pub const NAME: &str = "stability";
pub const ENGINE: &str = "stable-diffusion-xl-1024-v1-0";
/// Cost per generated image.
pub const COST_PER_IMAGE: f64 = 0.04;

#[derive(Debug, Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    base64: String,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Stability AI REST client.
pub struct StabilityClient {
    http: Client,
    endpoint: ApiEndpoint,
    timeout: Duration,
}

impl StabilityClient {
    pub fn new(endpoint: ApiEndpoint, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint,
            timeout,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::new(config.stability.clone(), config.request_timeout)
    }
}

impl Provider for StabilityClient {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }
}

#[async_trait]
impl ImageProvider for StabilityClient {
    async fn generate(&self, request: &ImageRequest) -> ProviderResult<ImageResult> {
        let key = require_key(&self.endpoint.api_key, NAME)?;
        let started = Instant::now();

        let body = json!({
            "text_prompts": [
                { "text": request.styled_prompt(), "weight": 1.0 },
                { "text": request.negative_prompt(), "weight": -1.0 },
            ],
            "cfg_scale": 7,
            "width": request.width,
            "height": request.height,
            "samples": 1,
            "steps": 30,
        });

        let response = self
            .http
            .post(
                self.endpoint
                    .url(&format!("/v1/generation/{}/text-to-image", ENGINE)),
            )
            .bearer_auth(key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let parsed: TextToImageResponse = check_status(response).await?.json().await?;

        let artifact = parsed
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no artifacts returned"))?;
        if artifact.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
            return Err(ProviderError::BadRequest("prompt rejected by content filter".into()));
        }

        let data = STANDARD
            .decode(artifact.base64.as_bytes())
            .map_err(|e| ProviderError::invalid_response(format!("artifact is not base64: {}", e)))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(provider = NAME, elapsed_ms, bytes = data.len(), "Image generated");

        Ok(ImageResult {
            content: ContentRef::bytes(data, "image/png"),
            provider: NAME.to_string(),
            cost: COST_PER_IMAGE,
            elapsed_ms,
        })
    }
}
