//! Per-capability generation requests and results.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to produced or consumed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// Remote content (http(s) or data: URL).
    Url { url: String },
    /// File on the local filesystem.
    File { path: PathBuf },
    /// Inline payload.
    Bytes { data: Vec<u8>, mime: String },
}

impl ContentRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn bytes(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self::Bytes {
            data,
            mime: mime.into(),
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            ContentRef::Url { url } => Some(url),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ContentRef::File { path } => Some(path),
            _ => None,
        }
    }

    /// Short description for logs (never includes payload bytes).
    pub fn describe(&self) -> String {
        match self {
            ContentRef::Url { url } if url.starts_with("data:") => "data-url".to_string(),
            ContentRef::Url { url } => url.clone(),
            ContentRef::File { path } => path.display().to_string(),
            ContentRef::Bytes { data, mime } => format!("{} ({} bytes)", mime, data.len()),
        }
    }

    /// File extension to use when the content is written to disk.
    pub fn extension_hint(&self) -> &str {
        let mime = match self {
            ContentRef::Bytes { mime, .. } => mime.as_str(),
            ContentRef::Url { url } if url.starts_with("data:") => url
                .trim_start_matches("data:")
                .split(';')
                .next()
                .unwrap_or(""),
            ContentRef::Url { url } => {
                return url
                    .split('?')
                    .next()
                    .and_then(|p| p.rsplit('/').next())
                    .and_then(|name| name.rsplit_once('.'))
                    .map(|(_, ext)| ext)
                    .filter(|ext| !ext.is_empty() && ext.len() <= 4)
                    .unwrap_or("bin");
            }
            ContentRef::File { path } => {
                return path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
            }
        };
        mime_extension(mime)
    }
}

fn mime_extension(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// Visual style preset for image generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    #[default]
    Realistic,
    Anime,
    Cinematic,
    Artistic,
    Photographic,
    DigitalArt,
    Sketch,
    Watercolor,
}

impl ImageStyle {
    pub fn prompt_suffix(&self) -> &'static str {
        match self {
            ImageStyle::Realistic => "photorealistic, highly detailed, 8k, professional photography",
            ImageStyle::Anime => "anime style, vibrant colors, detailed illustration",
            ImageStyle::Cinematic => "cinematic lighting, dramatic, film still, wide angle",
            ImageStyle::Artistic => "artistic, creative, unique style, masterpiece",
            ImageStyle::Photographic => "professional photograph, natural lighting, sharp focus",
            ImageStyle::DigitalArt => "digital art, concept art, trending on artstation",
            ImageStyle::Sketch => "pencil sketch, hand drawn, black and white",
            ImageStyle::Watercolor => "watercolor painting, soft colors, artistic",
        }
    }

    pub fn negative_prompt(&self) -> &'static str {
        match self {
            ImageStyle::Realistic | ImageStyle::Photographic => {
                "cartoon, anime, illustration, painting, blurry, low quality"
            }
            ImageStyle::Anime => "realistic, photograph, 3d render, low quality",
            ImageStyle::Cinematic => "amateur, snapshot, low quality, blurry",
            ImageStyle::Artistic | ImageStyle::DigitalArt => "blurry, low quality, distorted",
            ImageStyle::Sketch => "color, photograph, low quality",
            ImageStyle::Watercolor => "photograph, digital, sharp edges, low quality",
        }
    }
}

/// Narrator voice gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    Male,
    #[default]
    Female,
}

/// Emotional tone for speech synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTone {
    Neutral,
    Happy,
    Sad,
    Excited,
    Calm,
    Professional,
    #[default]
    Friendly,
    Dramatic,
}

/// Voice stability and similarity settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl EmotionTone {
    pub fn voice_settings(&self) -> VoiceSettings {
        let (stability, similarity_boost) = match self {
            EmotionTone::Neutral => (0.5, 0.75),
            EmotionTone::Happy => (0.4, 0.7),
            EmotionTone::Sad => (0.6, 0.8),
            EmotionTone::Excited => (0.3, 0.65),
            EmotionTone::Calm => (0.7, 0.85),
            EmotionTone::Professional => (0.6, 0.8),
            EmotionTone::Friendly => (0.45, 0.7),
            EmotionTone::Dramatic => (0.35, 0.65),
        };
        VoiceSettings {
            stability,
            similarity_boost,
        }
    }
}

/// Request for a single generated image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: ImageStyle,
    pub width: u32,
    pub height: u32,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>, style: ImageStyle, width: u32, height: u32) -> Self {
        Self {
            prompt: prompt.into(),
            style,
            width,
            height,
        }
    }

    /// Prompt with the style suffix applied.
    pub fn styled_prompt(&self) -> String {
        format!("{}, {}", self.prompt.trim(), self.style.prompt_suffix())
    }

    pub fn negative_prompt(&self) -> &'static str {
        self.style.negative_prompt()
    }
}

/// Request for synthesized narration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub gender: VoiceGender,
    #[serde(default)]
    pub emotion: EmotionTone,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, gender: VoiceGender, emotion: EmotionTone) -> Self {
        Self {
            text: text.into(),
            gender,
            emotion,
        }
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResult {
    /// Produced content
    pub content: ContentRef,
    /// Provider that produced it
    pub provider: String,
    /// Estimated cost in provider currency units
    pub cost: f64,
    /// Wall-clock time of the call
    pub elapsed_ms: u64,
}

pub type ImageResult = GenerationResult;
pub type SpeechResult = GenerationResult;
