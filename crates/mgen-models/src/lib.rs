//! Shared data models for the media generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job identity, stages and externally visible snapshots
//! - Per-capability generation requests and results
//! - Scenes and composition contracts
//! - Encoding configuration
//! - Cost entries and progress events

pub mod cost;
pub mod encoding;
pub mod event;
pub mod generation;
pub mod job;
pub mod job_state;
pub mod request;
pub mod scene;

// Re-export common types
pub use cost::{Capability, CostEntry};
pub use encoding::EncodingConfig;
pub use event::{JobEvent, JobEventEnvelope};
pub use generation::{
    ContentRef, EmotionTone, GenerationResult, ImageRequest, ImageResult, ImageStyle,
    SpeechRequest, SpeechResult, VoiceGender, VoiceSettings,
};
pub use job::{JobId, JobStage, JobStatus};
pub use job_state::{JobError, JobResult, JobSnapshot, JobView, Mutation, ViewStatus};
pub use request::{
    GenerationOptions, GenerationRequest, Resolution, SceneBrief, DEFAULT_SCENE_COUNT,
};
pub use scene::{
    CompositionRequest, CompositionResult, Scene, SubtitlePosition, SubtitleStyle, TransitionKind,
};
