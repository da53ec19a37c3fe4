//! Provider configuration.

use std::time::Duration;

use crate::retry::RetryPolicy;

pub const REPLICATE_BASE_URL: &str = "https://api.replicate.com";
pub const STABILITY_BASE_URL: &str = "https://api.stability.ai";
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const RUNWAY_BASE_URL: &str = "https://api.runwayml.com";
pub const PIKA_BASE_URL: &str = "https://api.pika.art";

/// SDXL model version on Replicate.
pub const DEFAULT_REPLICATE_MODEL: &str =
    "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Credentials and base URL of one HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ApiEndpoint {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Read `{key_var}` and an optional `{url_var}` override.
    pub fn from_env(key_var: &str, url_var: &str, default_url: &str) -> Self {
        Self::new(
            std::env::var(key_var).ok(),
            std::env::var(url_var).unwrap_or_else(|_| default_url.to_string()),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Configuration for every provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub replicate: ApiEndpoint,
    pub replicate_model: String,
    /// Interval between prediction polls
    pub replicate_poll_interval: Duration,
    /// Polls before a prediction is considered timed out
    pub replicate_max_polls: u32,
    pub stability: ApiEndpoint,
    pub elevenlabs: ApiEndpoint,
    pub openai: ApiEndpoint,
    pub openai_model: String,
    pub runway: ApiEndpoint,
    pub pika: ApiEndpoint,
    /// HTTP request timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            replicate: ApiEndpoint::new(None, REPLICATE_BASE_URL),
            replicate_model: DEFAULT_REPLICATE_MODEL.to_string(),
            replicate_poll_interval: Duration::from_secs(1),
            replicate_max_polls: 120,
            stability: ApiEndpoint::new(None, STABILITY_BASE_URL),
            elevenlabs: ApiEndpoint::new(None, ELEVENLABS_BASE_URL),
            openai: ApiEndpoint::new(None, OPENAI_BASE_URL),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            runway: ApiEndpoint::new(None, RUNWAY_BASE_URL),
            pika: ApiEndpoint::new(None, PIKA_BASE_URL),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            replicate: ApiEndpoint::from_env(
                "REPLICATE_API_TOKEN",
                "REPLICATE_BASE_URL",
                REPLICATE_BASE_URL,
            ),
            replicate_model: std::env::var("REPLICATE_MODEL").unwrap_or(defaults.replicate_model),
            replicate_poll_interval: std::env::var("REPLICATE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.replicate_poll_interval),
            replicate_max_polls: std::env::var("REPLICATE_MAX_POLLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.replicate_max_polls),
            stability: ApiEndpoint::from_env(
                "STABILITY_API_KEY",
                "STABILITY_BASE_URL",
                STABILITY_BASE_URL,
            ),
            elevenlabs: ApiEndpoint::from_env(
                "ELEVENLABS_API_KEY",
                "ELEVENLABS_BASE_URL",
                ELEVENLABS_BASE_URL,
            ),
            openai: ApiEndpoint::from_env("OPENAI_API_KEY", "OPENAI_BASE_URL", OPENAI_BASE_URL),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            runway: ApiEndpoint::from_env("RUNWAY_API_KEY", "RUNWAY_BASE_URL", RUNWAY_BASE_URL),
            pika: ApiEndpoint::from_env("PIKA_API_KEY", "PIKA_BASE_URL", PIKA_BASE_URL),
            request_timeout: Duration::from_secs(
                std::env::var("PROVIDER_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            retry: RetryPolicy::from_env(),
        }
    }
}
