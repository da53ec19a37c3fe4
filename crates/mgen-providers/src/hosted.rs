//! Hosted image-to-video services (Runway, Pika).
//!
//! These only animate the first scene, so every result is degraded.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use mgen_models::{CompositionRequest, CompositionResult, ContentRef};

use crate::config::{ApiEndpoint, ProviderConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, require_key, send_error};
use crate::traits::{CompositionProvider, Provider};

/// Supported hosted services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedService {
    Runway,
    Pika,
}

impl HostedService {
    pub fn name(&self) -> &'static str {
        match self {
            HostedService::Runway => "runway",
            HostedService::Pika => "pika",
        }
    }

    /// Cost per generated second.
    pub fn cost_per_second(&self) -> f64 {
        match self {
            HostedService::Runway => 0.05,
            HostedService::Pika => 0.04,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            HostedService::Runway => "/v1/image-to-video",
            HostedService::Pika => "/v1/generate",
        }
    }

    fn body(&self, image: String, seconds: u32) -> Value {
        match self {
            HostedService::Runway => json!({ "image": image, "duration": seconds }),
            HostedService::Pika => json!({ "image_url": image, "duration": seconds }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    video_url: Option<String>,
}

/// Image URL or data URI accepted by the hosted APIs.
async fn image_reference(image: &ContentRef) -> ProviderResult<String> {
    match image {
        ContentRef::Url { url } => Ok(url.clone()),
        ContentRef::Bytes { data, mime } => Ok(data_uri(mime, data)),
        ContentRef::File { path } => {
            let data = tokio::fs::read(path).await.map_err(|e| {
                ProviderError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
            })?;
            let mime = match image.extension_hint() {
                "png" => "image/png",
                "webp" => "image/webp",
                _ => "image/jpeg",
            };
            Ok(data_uri(mime, &data))
        }
    }
}

fn data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Client for one hosted image-to-video service.
pub struct HostedVideoClient {
    http: Client,
    endpoint: ApiEndpoint,
    service: HostedService,
    timeout: Duration,
}

impl HostedVideoClient {
    pub fn new(service: HostedService, endpoint: ApiEndpoint, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint,
            service,
            timeout,
        })
    }

    pub fn runway(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::new(HostedService::Runway, config.runway.clone(), config.request_timeout)
    }

    pub fn pika(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::new(HostedService::Pika, config.pika.clone(), config.request_timeout)
    }

    pub fn service(&self) -> HostedService {
        self.service
    }
}

impl Provider for HostedVideoClient {
    fn name(&self) -> &str {
        self.service.name()
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }
}

#[async_trait]
impl CompositionProvider for HostedVideoClient {
    async fn compose(&self, request: &CompositionRequest) -> ProviderResult<CompositionResult> {
        let name = self.service.name();
        let key = require_key(&self.endpoint.api_key, name)?;
        let first = request
            .scenes
            .first()
            .ok_or_else(|| ProviderError::InvalidInput("at least one scene is required".into()))?;
        let started = Instant::now();

        let seconds = first.duration.round().max(1.0) as u32;
        let body = self.service.body(image_reference(&first.image).await?, seconds);

        let response = self
            .http
            .post(self.endpoint.url(self.service.path()))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let parsed: VideoResponse = check_status(response).await?.json().await?;
        let video_url = parsed
            .video_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::invalid_response("no video_url in response"))?;

        let duration = f64::from(seconds);
        info!(
            provider = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            scenes_dropped = request.scenes.len() - 1,
            "Hosted composition finished"
        );

        Ok(CompositionResult {
            artifact: ContentRef::url(video_url),
            duration,
            provider: name.to_string(),
            degraded: true,
            cost: duration * self.service.cost_per_second(),
        })
    }
}
