//! Scenes and composition contracts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::encoding::EncodingConfig;
use crate::generation::ContentRef;

/// Default transition length in seconds.
pub const DEFAULT_TRANSITION_DURATION: f64 = 0.5;
/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// Transition applied between a scene and the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    None,
    #[default]
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    Dissolve,
    Zoom,
}

impl TransitionKind {
    /// FFmpeg `xfade` transition name, `None` for hard cuts.
    pub fn xfade_name(&self) -> Option<&'static str> {
        match self {
            TransitionKind::None => None,
            TransitionKind::Fade => Some("fade"),
            TransitionKind::SlideLeft => Some("slideleft"),
            TransitionKind::SlideRight => Some("slideright"),
            TransitionKind::SlideUp => Some("slideup"),
            TransitionKind::SlideDown => Some("slidedown"),
            TransitionKind::Dissolve => Some("dissolve"),
            TransitionKind::Zoom => Some("zoomin"),
        }
    }
}

/// Vertical subtitle placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitlePosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// One element of the composition timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Scene image
    pub image: ContentRef,
    /// Duration in seconds (> 0)
    pub duration: f64,
    /// Transition into the next scene
    #[serde(default)]
    pub transition: TransitionKind,
    /// Configured transition duration in seconds
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,
    /// Burned-in subtitle text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub subtitle_position: SubtitlePosition,
}

fn default_transition_duration() -> f64 {
    DEFAULT_TRANSITION_DURATION
}

impl Scene {
    pub fn new(image: ContentRef, duration: f64) -> Self {
        Self {
            image,
            duration,
            transition: TransitionKind::Fade,
            transition_duration: DEFAULT_TRANSITION_DURATION,
            subtitle: None,
            subtitle_position: SubtitlePosition::Bottom,
        }
    }

    pub fn with_transition(mut self, transition: TransitionKind, duration: f64) -> Self {
        self.transition = transition;
        self.transition_duration = duration;
        self
    }

    pub fn with_subtitle(mut self, text: impl Into<String>, position: SubtitlePosition) -> Self {
        self.subtitle = Some(text.into());
        self.subtitle_position = position;
        self
    }
}

/// Subtitle rendering style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleStyle {
    pub font_size: u32,
    pub font_color: String,
    pub outline_color: String,
    pub outline_width: u32,
    /// Distance from the top/bottom edge in pixels
    pub margin: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_size: 48,
            font_color: "white".to_string(),
            outline_color: "black".to_string(),
            outline_width: 2,
            margin: 50,
        }
    }
}

/// Input to a composition provider.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompositionRequest {
    pub scenes: Vec<Scene>,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Narration tracks, played back to back
    #[serde(default)]
    pub audio: Vec<ContentRef>,
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

impl CompositionRequest {
    pub fn new(scenes: Vec<Scene>, width: u32, height: u32) -> Self {
        Self {
            scenes,
            width,
            height,
            fps: DEFAULT_FPS,
            audio: Vec::new(),
            subtitle_style: SubtitleStyle::default(),
            encoding: EncodingConfig::default(),
        }
    }

    pub fn with_audio(mut self, audio: Vec<ContentRef>) -> Self {
        self.audio = audio;
        self
    }

    /// Sum of scene durations.
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }
}

/// Output of a composition provider.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompositionResult {
    pub artifact: ContentRef,
    /// Duration in seconds
    pub duration: f64,
    pub provider: String,
    /// Produced by a fallback that dropped scenes or subtitles
    pub degraded: bool,
    pub cost: f64,
}
