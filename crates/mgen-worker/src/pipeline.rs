//! Pipeline orchestrator.
//!
//! Drives one job through `analyzing → generating_images → generating_audio →
//! composing → finalizing` and records the outcome in the state store.
//! Stages run strictly in order. Within the image and audio stages, items
//! run concurrently up to `max_item_parallel` and the stage fails as soon as
//! any item does.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use mgen_models::{
    Capability, CompositionRequest, CompositionResult, ContentRef, GenerationRequest,
    GenerationResult, ImageRequest, JobError, JobId, JobResult, JobStage, Mutation, Scene,
    SceneBrief, SpeechRequest, SubtitlePosition, DEFAULT_SCENE_COUNT,
};
use mgen_providers::{InvokeError, Invoked, ProviderConfig, ProviderRegistry};
use mgen_store::JobStateStore;

use crate::compositor::{Compositor, FfmpegCompositor};
use crate::config::WorkerConfig;
use crate::cost::CostLedger;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::sink::{artifact_key, ArtifactSink, LocalArtifactSink};

/// Progress written on entry to each stage.
mod budget {
    pub const ANALYZING: u8 = 5;
    pub const ANALYZED: u8 = 20;
    pub const IMAGES: (u8, u8) = (20, 40);
    pub const AUDIO: (u8, u8) = (60, 20);
    pub const COMPOSING: u8 = 80;
    pub const COMPOSED: u8 = 90;
    pub const FINALIZING: u8 = 95;
}

fn stage_data(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Per-process pipeline context: provider chains, compositor, store and sink.
pub struct Pipeline {
    registry: Arc<ProviderRegistry>,
    compositor: Arc<Compositor>,
    store: Arc<dyn JobStateStore>,
    sink: Arc<dyn ArtifactSink>,
    config: WorkerConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        compositor: Arc<Compositor>,
        store: Arc<dyn JobStateStore>,
        sink: Arc<dyn ArtifactSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            compositor,
            store,
            sink,
            config,
        }
    }

    /// Build the default pipeline: configured providers, local FFmpeg with
    /// hosted fallback, artifacts under `output_dir`.
    pub fn from_config(
        providers: &ProviderConfig,
        store: Arc<dyn JobStateStore>,
        config: WorkerConfig,
    ) -> PipelineResult<Self> {
        let registry = ProviderRegistry::from_config(providers)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        let local = FfmpegCompositor::new(config.output_dir.join("renders"), config.render_timeout)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        let compositor = Compositor::new(
            Arc::new(local),
            registry.hosted_video.clone(),
            &providers.retry,
            config.render_retries,
            config.render_timeout,
        );
        let sink = LocalArtifactSink::new(
            config.output_dir.join("artifacts"),
            config.public_base_url.clone(),
        );

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(compositor),
            store,
            Arc::new(sink),
            config,
        ))
    }

    pub fn store(&self) -> &Arc<dyn JobStateStore> {
        &self.store
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run a job whose pending snapshot already exists.
    ///
    /// The terminal snapshot is written before returning, on success and on
    /// failure alike.
    pub async fn execute(
        &self,
        job_id: &JobId,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<JobResult> {
        let mut run = JobRun::new(self, job_id, request, cancel);
        let span = run.logger.create_span();
        run.logger.log_start(&format!(
            "project {} with {} explicit scenes",
            request.project_id,
            request.scenes.len()
        ));

        let timed = tokio::time::timeout(self.config.job_timeout, run.stages())
            .instrument(span.clone())
            .await;
        let outcome = match timed {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout(self.config.job_timeout.as_secs())),
        };

        run.finish(outcome).instrument(span).await
    }
}

/// State of one job execution.
struct JobRun<'a> {
    pipeline: &'a Pipeline,
    job_id: &'a JobId,
    request: &'a GenerationRequest,
    cancel: &'a CancellationToken,
    logger: JobLogger,
    ledger: CostLedger,
    stage: JobStage,
    stage_started: Instant,
}

impl<'a> JobRun<'a> {
    fn new(
        pipeline: &'a Pipeline,
        job_id: &'a JobId,
        request: &'a GenerationRequest,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            job_id,
            request,
            cancel,
            logger: JobLogger::new(job_id, "generation"),
            ledger: CostLedger::new(),
            stage: JobStage::Pending,
            stage_started: Instant::now(),
        }
    }

    async fn stages(&mut self) -> PipelineResult<JobResult> {
        let briefs = self.analyze().await?;
        let images = self.generate_images(&briefs).await?;
        let tracks = self.generate_audio(&briefs).await?;
        let composition = self.compose(&briefs, &images, tracks).await?;
        self.finalize(composition, &images).await
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn analyze(&mut self) -> PipelineResult<Vec<SceneBrief>> {
        self.enter(JobStage::Analyzing, budget::ANALYZING, None).await?;

        let briefs = if !self.request.scenes.is_empty() {
            self.log("Using provided scenes").await;
            self.request.scenes.clone()
        } else {
            let prompt = self
                .request
                .prompt
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    PipelineError::invalid_request("a prompt or explicit scenes are required")
                })?;

            self.log("Analyzing prompt").await;
            let chain = &self.pipeline.registry.analysis;
            let invoked = self
                .guarded(async {
                    chain
                        .invoke(|analyzer| async move {
                            analyzer.analyze(prompt, DEFAULT_SCENE_COUNT).await
                        })
                        .await
                        .map_err(PipelineError::from)
                })
                .await?;
            self.ledger
                .record(&invoked.provider, Capability::Analysis, 0.0);
            invoked.value
        };

        if briefs.is_empty() {
            return Err(PipelineError::invalid_request("analysis produced no scenes"));
        }

        self.progress(
            budget::ANALYZED,
            stage_data(json!({ "scene_count": briefs.len() })),
        )
        .await?;
        Ok(briefs)
    }

    async fn generate_images(&mut self, briefs: &[SceneBrief]) -> PipelineResult<Vec<GenerationResult>> {
        let (base, span) = budget::IMAGES;
        self.enter(
            JobStage::GeneratingImages,
            base,
            stage_data(json!({ "completed": 0, "total": briefs.len() })),
        )
        .await?;

        let options = &self.request.options;
        let (width, height) = options.resolution.dimensions();
        let requests: Vec<ImageRequest> = briefs
            .iter()
            .map(|brief| ImageRequest::new(brief.prompt.clone(), options.style, width, height))
            .collect();

        let chain = &self.pipeline.registry.images;
        self.run_items(Capability::Image, base, span, requests, |request| async move {
            let request = &request;
            chain
                .invoke(move |provider| async move { provider.generate(request).await })
                .await
        })
        .await
    }

    async fn generate_audio(&mut self, briefs: &[SceneBrief]) -> PipelineResult<Vec<ContentRef>> {
        let (base, span) = budget::AUDIO;
        let request = self.request;
        let options = &request.options;
        let narrations: Vec<String> = briefs
            .iter()
            .filter_map(|brief| brief.narration.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect();

        if !options.with_audio || narrations.is_empty() {
            let reason = if options.with_audio {
                "no narration"
            } else {
                "audio disabled"
            };
            self.enter(
                JobStage::GeneratingAudio,
                base + span,
                stage_data(json!({ "skipped": true, "reason": reason })),
            )
            .await?;
            return Ok(Vec::new());
        }

        self.enter(
            JobStage::GeneratingAudio,
            base,
            stage_data(json!({ "completed": 0, "total": narrations.len() })),
        )
        .await?;

        let requests: Vec<SpeechRequest> = narrations
            .into_iter()
            .map(|text| SpeechRequest::new(text, options.voice_gender, options.emotion))
            .collect();

        let chain = &self.pipeline.registry.speech;
        let results = self
            .run_items(Capability::Speech, base, span, requests, |request| async move {
                let request = &request;
                chain
                    .invoke(move |provider| async move { provider.generate(request).await })
                    .await
            })
            .await?;

        Ok(results.into_iter().map(|r| r.content).collect())
    }

    async fn compose(
        &mut self,
        briefs: &[SceneBrief],
        images: &[GenerationResult],
        tracks: Vec<ContentRef>,
    ) -> PipelineResult<CompositionResult> {
        self.enter(JobStage::Composing, budget::COMPOSING, None).await?;

        let job_request = self.request;
        let options = &job_request.options;
        let (width, height) = options.resolution.dimensions();
        let scenes: Vec<Scene> = briefs
            .iter()
            .zip(images)
            .map(|(brief, image)| {
                let scene = Scene::new(image.content.clone(), options.scene_duration)
                    .with_transition(options.transition, options.transition_duration);
                match brief.subtitle_text().filter(|_| options.with_subtitles) {
                    Some(text) => scene.with_subtitle(text, SubtitlePosition::Bottom),
                    None => scene,
                }
            })
            .collect();
        let request = CompositionRequest::new(scenes, width, height).with_audio(tracks);

        self.log(&format!(
            "Composing {} scenes ({:.1}s)",
            request.scenes.len(),
            request.total_duration()
        ))
        .await;

        let compositor = &self.pipeline.compositor;
        let invoked = self
            .guarded(async {
                compositor
                    .compose(&request)
                    .await
                    .map_err(|e| PipelineError::Composition(e.to_string()))
            })
            .await?;

        let composition = invoked.value;
        self.ledger
            .record(&invoked.provider, Capability::Composition, composition.cost);
        if composition.degraded {
            self.logger.log_warning(&format!(
                "Composed by {} from the first scene only",
                composition.provider
            ));
            self.log("Local rendering unavailable; used hosted fallback").await;
        }

        self.progress(
            budget::COMPOSED,
            stage_data(json!({
                "provider": composition.provider,
                "degraded": composition.degraded,
            })),
        )
        .await?;
        Ok(composition)
    }

    async fn finalize(
        &mut self,
        composition: CompositionResult,
        images: &[GenerationResult],
    ) -> PipelineResult<JobResult> {
        self.enter(JobStage::Finalizing, budget::FINALIZING, None).await?;

        let now = Utc::now();
        let sink = &self.pipeline.sink;
        let video_key = artifact_key("videos", self.job_id, "mp4", now);
        let video_url = self
            .guarded(sink.put(&video_key, &composition.artifact))
            .await?;

        let thumbnail_url = match images.first() {
            Some(first) => {
                let key = artifact_key(
                    "thumbnails",
                    self.job_id,
                    first.content.extension_hint(),
                    now,
                );
                match sink.put(&key, &first.content).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        self.logger
                            .log_warning(&format!("Thumbnail not stored: {}", e));
                        None
                    }
                }
            }
            None => None,
        };

        Ok(JobResult {
            video_url,
            thumbnail_url,
            duration: composition.duration,
            provider: composition.provider,
            degraded: composition.degraded,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run one provider call per request and join on all of them.
    ///
    /// Progress moves from `base` to `base + span` as items complete.
    /// Results keep request order.
    async fn run_items<R, F, Fut>(
        &self,
        capability: Capability,
        base: u8,
        span: u8,
        requests: Vec<R>,
        call: F,
    ) -> PipelineResult<Vec<GenerationResult>>
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = Result<Invoked<GenerationResult>, InvokeError>>,
    {
        let total = requests.len();
        let stage = self.stage;
        let parallel = self.pipeline.config.max_item_parallel.max(1);

        let mut results: Vec<Option<GenerationResult>> = vec![None; total];
        let mut pending = std::pin::pin!(stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let call = call(request);
                async move { (index, call.await) }
            })
            .buffer_unordered(parallel));

        let mut done = 0usize;
        while let Some((index, outcome)) = self.guarded(async { Ok(pending.next().await) }).await? {
            match outcome {
                Ok(invoked) => {
                    self.ledger
                        .record(&invoked.provider, capability, invoked.value.cost);
                    debug!(
                        stage = stage.as_str(),
                        index,
                        provider = %invoked.provider,
                        attempts = invoked.attempts,
                        "Item completed"
                    );
                    results[index] = Some(invoked.value);
                    done += 1;

                    let percent = base + (done * span as usize / total) as u8;
                    self.progress(
                        percent,
                        stage_data(json!({ "completed": done, "total": total })),
                    )
                    .await?;
                }
                Err(e) => {
                    return Err(PipelineError::StageJoin {
                        stage,
                        index,
                        total,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Race `work` against cancellation.
    async fn guarded<T>(&self, work: impl Future<Output = PipelineResult<T>>) -> PipelineResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            result = work => result,
        }
    }

    async fn enter(
        &mut self,
        stage: JobStage,
        percent: u8,
        data: Option<Map<String, Value>>,
    ) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.close_stage();
        self.stage = stage;
        self.logger.log_stage(stage, percent);
        self.progress(percent, data).await
    }

    async fn progress(&self, percent: u8, data: Option<Map<String, Value>>) -> PipelineResult<()> {
        let outcome = self
            .pipeline
            .store
            .set_progress(self.job_id, self.stage, percent, data)
            .await?;

        match outcome {
            Mutation::Applied => Ok(()),
            // Someone else finished the job.
            Mutation::Terminal => Err(PipelineError::Cancelled),
            Mutation::Backward => {
                warn!(
                    job_id = %self.job_id,
                    stage = self.stage.as_str(),
                    percent,
                    "Progress update rejected"
                );
                Ok(())
            }
        }
    }

    async fn log(&self, message: &str) {
        if let Err(e) = self.pipeline.store.log(self.job_id, message).await {
            debug!(job_id = %self.job_id, "Failed to publish log line: {}", e);
        }
    }

    fn close_stage(&mut self) {
        if self.stage != JobStage::Pending {
            metrics::record_stage_duration(
                self.stage.as_str(),
                self.stage_started.elapsed().as_secs_f64(),
            );
        }
        self.stage_started = Instant::now();
    }

    /// Write the terminal snapshot with the accumulated costs.
    async fn finish(&mut self, outcome: PipelineResult<JobResult>) -> PipelineResult<JobResult> {
        self.close_stage();
        let costs = self.ledger.entries();
        metrics::record_job_cost(self.ledger.total());

        match outcome {
            Ok(result) => {
                let applied = self
                    .pipeline
                    .store
                    .complete(self.job_id, result.clone(), costs)
                    .await?;
                if !applied.is_applied() {
                    warn!(job_id = %self.job_id, ?applied, "Completion not recorded");
                }
                metrics::record_completed(&result.provider, result.degraded);
                self.logger.log_completion(&format!(
                    "{} ({:.1}s, ${:.3})",
                    result.video_url,
                    result.duration,
                    self.ledger.total()
                ));
                Ok(result)
            }
            Err(err) => {
                let message = err.to_string();
                self.logger.log_error(self.stage, &message);
                metrics::record_failed(self.stage.as_str());

                let failure = JobError::new(message, self.stage);
                if let Err(store_err) = self.pipeline.store.fail(self.job_id, failure, costs).await {
                    error!(
                        job_id = %self.job_id,
                        "Failed to record job failure: {}", store_err
                    );
                }
                Err(err)
            }
        }
    }
}
