//! OpenAI chat-completion prompt analyzer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use mgen_models::SceneBrief;

use crate::config::{ApiEndpoint, ProviderConfig, DEFAULT_OPENAI_MODEL};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, require_key, send_error};
use crate::traits::{ContentAnalyzer, Provider};

pub const NAME: &str = "openai";

const SYSTEM_PROMPT: &str = "You are a video storyboard writer. Split the user's prompt into \
short scenes. Respond with a JSON object of the form \
{\"scenes\": [{\"prompt\": \"image description\", \"narration\": \"spoken line\", \
\"subtitle\": \"on-screen text\"}]}. Keep narration under 40 words per scene.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Storyboard {
    #[serde(default)]
    scenes: Vec<SceneBrief>,
}

/// Parse the model's JSON answer into at most `max_scenes` briefs.
fn parse_storyboard(content: &str, max_scenes: usize) -> ProviderResult<Vec<SceneBrief>> {
    let storyboard: Storyboard = serde_json::from_str(content)?;
    let scenes: Vec<SceneBrief> = storyboard
        .scenes
        .into_iter()
        .filter(|s| !s.prompt.trim().is_empty())
        .take(max_scenes)
        .collect();

    if scenes.is_empty() {
        return Err(ProviderError::invalid_response("storyboard has no scenes"));
    }
    Ok(scenes)
}

/// Prompt analyzer backed by the chat completions API.
pub struct OpenAiAnalyzer {
    http: Client,
    endpoint: ApiEndpoint,
    model: String,
    timeout: Duration,
}

impl OpenAiAnalyzer {
    pub fn new(endpoint: ApiEndpoint, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Ok(Self::new(config.openai.clone(), config.request_timeout)?
            .with_model(config.openai_model.clone()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Provider for OpenAiAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }
}

#[async_trait]
impl ContentAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, prompt: &str, max_scenes: usize) -> ProviderResult<Vec<SceneBrief>> {
        let key = require_key(&self.endpoint.api_key, NAME)?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Create at most {} scenes for: {}", max_scenes, prompt)
                },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.7,
            "max_tokens": 2000,
        });

        let response = self
            .http
            .post(self.endpoint.url("/v1/chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let chat: ChatResponse = check_status(response).await?.json().await?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::invalid_response("empty completion"))?;
        debug!(chars = content.len(), "Storyboard received");

        let scenes = parse_storyboard(&content, max_scenes)?;
        info!(provider = NAME, scenes = scenes.len(), "Prompt analyzed");
        Ok(scenes)
    }
}
