//! Replicate image generation (SDXL).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use mgen_models::{ContentRef, ImageRequest, ImageResult};

use crate::config::{ApiEndpoint, ProviderConfig, DEFAULT_REPLICATE_MODEL};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, require_key, send_error};
use crate::traits::{ImageProvider, Provider};

pub const NAME: &str = "replicate";
/// Cost per generated image.
pub const COST_PER_IMAGE: f64 = 0.005;

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; Replicate returns a list or a single string.
    fn first_output(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Replicate predictions client.
pub struct ReplicateClient {
    http: Client,
    endpoint: ApiEndpoint,
    model: String,
    timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateClient {
    pub fn new(endpoint: ApiEndpoint, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint,
            model: DEFAULT_REPLICATE_MODEL.to_string(),
            timeout,
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Ok(Self::new(config.replicate.clone(), config.request_timeout)?
            .with_model(config.replicate_model.clone())
            .with_polling(config.replicate_poll_interval, config.replicate_max_polls))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn poll(&self, token: &str, url: &str) -> ProviderResult<Prediction> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        Ok(check_status(response).await?.json().await?)
    }
}

impl Provider for ReplicateClient {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }
}

#[async_trait]
impl ImageProvider for ReplicateClient {
    async fn generate(&self, request: &ImageRequest) -> ProviderResult<ImageResult> {
        let token = require_key(&self.endpoint.api_key, NAME)?;
        let started = Instant::now();

        let body = json!({
            "version": self.model,
            "input": {
                "prompt": request.styled_prompt(),
                "negative_prompt": request.negative_prompt(),
                "width": request.width,
                "height": request.height,
                "num_outputs": 1,
            }
        });

        let response = self
            .http
            .post(self.endpoint.url("/v1/predictions"))
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let mut prediction: Prediction = check_status(response).await?.json().await?;
        debug!(prediction_id = %prediction.id, status = %prediction.status, "Replicate prediction created");

        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(ProviderError::Timeout(self.poll_interval * self.max_polls));
            }
            let get_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .ok_or_else(|| ProviderError::invalid_response("prediction has no poll URL"))?;

            tokio::time::sleep(self.poll_interval).await;
            prediction = self.poll(token, &get_url).await?;
            polls += 1;
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(ProviderError::GenerationFailed(reason));
        }

        let url = prediction
            .first_output()
            .ok_or_else(|| ProviderError::invalid_response("prediction has no output"))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(provider = NAME, elapsed_ms, "Image generated");

        Ok(ImageResult {
            content: ContentRef::url(url),
            provider: NAME.to_string(),
            cost: COST_PER_IMAGE,
            elapsed_ms,
        })
    }
}
