//! Video composition: local FFmpeg first, hosted services as fallback.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use mgen_media::{check_ffmpeg, materialize, plan_with_style, FfmpegRunner, MediaError};
use mgen_models::{Capability, CompositionRequest, CompositionResult, ContentRef};
use mgen_providers::{
    CompositionProvider, FallbackChain, InvokeError, Invoked, Provider, ProviderError,
    ProviderResult, RetryPolicy,
};

/// Provider name of the local renderer.
pub const LOCAL_PROVIDER: &str = "ffmpeg";

/// Slack between the render kill timeout and the invoker's call timeout.
const CALL_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Map a media failure onto the provider taxonomy.
///
/// A missing engine is fatal so the chain moves on to hosted services.
/// An unusable plan ends the chain. Failed or timed-out renders are retried.
fn provider_error(err: MediaError) -> ProviderError {
    if err.is_engine_unavailable() {
        return ProviderError::Unavailable(err.to_string());
    }
    match err {
        MediaError::Timeout(secs) => ProviderError::Timeout(Duration::from_secs(secs)),
        MediaError::InvalidPlan(msg) => ProviderError::InvalidInput(msg),
        MediaError::FileNotFound(path) => {
            ProviderError::InvalidInput(format!("missing input {}", path.display()))
        }
        MediaError::FfmpegFailed {
            message, stderr, ..
        } => {
            let detail = stderr
                .as_deref()
                .and_then(|s| s.lines().last())
                .unwrap_or_default();
            ProviderError::GenerationFailed(format!("{} {}", message, detail).trim().to_string())
        }
        other => ProviderError::GenerationFailed(other.to_string()),
    }
}

/// Renders a composition request with the local FFmpeg binary.
pub struct FfmpegCompositor {
    http: Client,
    work_dir: PathBuf,
    render_timeout: Duration,
}

impl FfmpegCompositor {
    pub fn new(work_dir: impl Into<PathBuf>, render_timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            http,
            work_dir: work_dir.into(),
            render_timeout,
        })
    }

    async fn render(&self, request: &CompositionRequest) -> Result<CompositionResult, MediaError> {
        check_ffmpeg()?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.work_dir)?;

        let mut scenes = request.scenes.clone();
        for (i, scene) in scenes.iter_mut().enumerate() {
            let path = materialize(&self.http, &scene.image, scratch.path(), &format!("scene_{:03}", i))
                .await?;
            scene.image = ContentRef::file(path);
        }

        let mut tracks = Vec::with_capacity(request.audio.len());
        for (i, track) in request.audio.iter().enumerate() {
            tracks.push(
                materialize(&self.http, track, scratch.path(), &format!("narration_{:03}", i))
                    .await?,
            );
        }

        let plan = plan_with_style(
            &scenes,
            request.width,
            request.height,
            request.fps,
            &request.subtitle_style,
        )?
        .with_audio(tracks);

        let name = format!("{}.mp4", Uuid::new_v4());
        let rendered = scratch.path().join(&name);
        let cmd = plan.to_command(&rendered, &request.encoding);
        let total = plan.total_duration;

        info!(
            scenes = scenes.len(),
            transitions = plan.transitions().count(),
            duration = total,
            "Rendering composition"
        );

        FfmpegRunner::new()
            .with_timeout(self.render_timeout)
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    percent = (progress.fraction(total) * 100.0).round() as u32,
                    speed = progress.speed,
                    "Render progress"
                );
            })
            .await?;

        let output = self.work_dir.join(name);
        tokio::fs::rename(&rendered, &output).await?;

        Ok(CompositionResult {
            artifact: ContentRef::file(&output),
            duration: total,
            provider: LOCAL_PROVIDER.to_string(),
            degraded: false,
            cost: 0.0,
        })
    }
}

impl Provider for FfmpegCompositor {
    fn name(&self) -> &str {
        LOCAL_PROVIDER
    }
}

#[async_trait]
impl CompositionProvider for FfmpegCompositor {
    async fn compose(&self, request: &CompositionRequest) -> ProviderResult<CompositionResult> {
        self.render(request).await.map_err(provider_error)
    }
}

/// Composition with ordered fallback.
pub struct Compositor {
    chain: FallbackChain<dyn CompositionProvider>,
}

impl Compositor {
    /// `local` is tried first, then each hosted service.
    ///
    /// Renders get `render_retries` retries and a call timeout a little above
    /// the render kill timeout.
    pub fn new(
        local: Arc<dyn CompositionProvider>,
        hosted: Vec<Arc<dyn CompositionProvider>>,
        base: &RetryPolicy,
        render_retries: u32,
        render_timeout: Duration,
    ) -> Self {
        let policy = base
            .clone()
            .with_max_retries(render_retries)
            .with_call_timeout(render_timeout + CALL_TIMEOUT_SLACK);

        let mut providers = Vec::with_capacity(hosted.len() + 1);
        providers.push(local);
        providers.extend(hosted);

        Self {
            chain: FallbackChain::new(Capability::Composition, providers, policy),
        }
    }

    pub fn chain(&self) -> &FallbackChain<dyn CompositionProvider> {
        &self.chain
    }

    pub async fn compose(
        &self,
        request: &CompositionRequest,
    ) -> Result<Invoked<CompositionResult>, InvokeError> {
        self.chain
            .invoke(|provider| async move { provider.compose(request).await })
            .await
    }
}
