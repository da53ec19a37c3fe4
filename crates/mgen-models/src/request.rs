//! Job submission types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::generation::{EmotionTone, ImageStyle, VoiceGender};
use crate::scene::{TransitionKind, DEFAULT_TRANSITION_DURATION};

/// Default length of each scene in seconds.
pub const DEFAULT_SCENE_DURATION: f64 = 5.0;
/// Scene count assumed when the request does not list scenes.
pub const DEFAULT_SCENE_COUNT: usize = 3;

/// Output resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Resolution {
    #[serde(rename = "720p")]
    P720,
    #[default]
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    /// Canvas size as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::P720 => (1280, 720),
            Resolution::P1080 => (1920, 1080),
        }
    }
}

/// Options controlling a generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerationOptions {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_true")]
    pub with_audio: bool,
    #[serde(default)]
    pub with_subtitles: bool,
    #[serde(default)]
    pub style: ImageStyle,
    #[serde(default)]
    pub voice_gender: VoiceGender,
    #[serde(default)]
    pub emotion: EmotionTone,
    #[serde(default)]
    pub transition: TransitionKind,
    #[serde(default = "default_transition_duration")]
    #[validate(range(min = 0.0, max = 5.0))]
    pub transition_duration: f64,
    #[serde(default = "default_scene_duration")]
    #[validate(range(min = 0.5, max = 60.0))]
    pub scene_duration: f64,
}

fn default_true() -> bool {
    true
}
fn default_transition_duration() -> f64 {
    DEFAULT_TRANSITION_DURATION
}
fn default_scene_duration() -> f64 {
    DEFAULT_SCENE_DURATION
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            with_audio: true,
            with_subtitles: false,
            style: ImageStyle::default(),
            voice_gender: VoiceGender::default(),
            emotion: EmotionTone::default(),
            transition: TransitionKind::default(),
            transition_duration: DEFAULT_TRANSITION_DURATION,
            scene_duration: DEFAULT_SCENE_DURATION,
        }
    }
}

/// Content of one scene as produced by analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SceneBrief {
    /// Image prompt
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    /// Narration text for the scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 5000))]
    pub narration: Option<String>,
    /// Subtitle text, used when subtitles are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub subtitle: Option<String>,
}

impl SceneBrief {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            narration: None,
            subtitle: None,
        }
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Subtitle to burn in, falling back to the narration.
    pub fn subtitle_text(&self) -> Option<&str> {
        self.subtitle
            .as_deref()
            .or(self.narration.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A content generation job submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerationRequest {
    /// Project the content belongs to
    #[validate(length(min = 1, max = 128))]
    pub project_id: String,
    /// Free-form prompt to analyze into scenes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 4000))]
    pub prompt: Option<String>,
    /// Explicit scenes; skips prompt analysis when present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(length(max = 20), nested)]
    pub scenes: Vec<SceneBrief>,
    #[serde(default)]
    #[validate(nested)]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            prompt: None,
            scenes: Vec::new(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_scenes(mut self, scenes: Vec<SceneBrief>) -> Self {
        self.scenes = scenes;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether there is anything to generate from.
    pub fn has_content(&self) -> bool {
        !self.scenes.is_empty()
            || self
                .prompt
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }

    /// Rough wall-clock estimate in seconds.
    pub fn estimated_duration_secs(&self) -> u64 {
        let scenes = if self.scenes.is_empty() {
            DEFAULT_SCENE_COUNT
        } else {
            self.scenes.len()
        } as u64;
        let audio = if self.options.with_audio { 30 } else { 0 };
        60 + scenes * 20 + audio + 30
    }
}
