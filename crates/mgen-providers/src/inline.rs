//! Offline analyzer: the prompt becomes a single scene.

use async_trait::async_trait;

use mgen_models::SceneBrief;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{ContentAnalyzer, Provider};

pub const NAME: &str = "inline";

/// Analyzer of last resort; always configured.
#[derive(Debug, Default, Clone)]
pub struct InlineAnalyzer;

impl Provider for InlineAnalyzer {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl ContentAnalyzer for InlineAnalyzer {
    async fn analyze(&self, prompt: &str, _max_scenes: usize) -> ProviderResult<Vec<SceneBrief>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ProviderError::InvalidInput("empty prompt".into()));
        }
        Ok(vec![SceneBrief::new(prompt).with_narration(prompt)])
    }
}
