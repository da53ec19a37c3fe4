//! External generation providers.
//!
//! This crate provides:
//! - Capability traits for image, speech, composition and prompt analysis
//! - HTTP clients for Replicate, Stability, ElevenLabs, OpenAI, Runway and Pika
//! - A retryable/fatal error taxonomy
//! - Retry with backoff and ordered provider fallback

pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod hosted;
mod http;
pub mod inline;
pub mod metrics;
pub mod openai;
pub mod registry;
pub mod replicate;
pub mod retry;
pub mod stability;
pub mod traits;

pub use config::{ApiEndpoint, ProviderConfig};
pub use elevenlabs::ElevenLabsClient;
pub use error::{ProviderError, ProviderResult};
pub use hosted::{HostedService, HostedVideoClient};
pub use inline::InlineAnalyzer;
pub use openai::OpenAiAnalyzer;
pub use registry::ProviderRegistry;
pub use replicate::ReplicateClient;
pub use retry::{invoke, FallbackChain, InvokeError, Invoked, ProviderFailure, RetryPolicy};
pub use stability::StabilityClient;
pub use traits::{CompositionProvider, ContentAnalyzer, ImageProvider, Provider, SpeechProvider};
