//! End-to-end pipeline tests with in-process providers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use mgen_models::{
    Capability, CompositionRequest, CompositionResult, ContentRef, GenerationOptions,
    GenerationRequest, GenerationResult, ImageRequest, ImageResult, JobEvent, JobId, JobStage,
    SceneBrief, SpeechRequest, SpeechResult, TransitionKind, ViewStatus,
};
use mgen_providers::{
    CompositionProvider, ContentAnalyzer, ImageProvider, Provider, ProviderError, ProviderRegistry,
    ProviderResult, RetryPolicy, SpeechProvider,
};
use mgen_store::{JobStateStore, MemoryJobStore};
use mgen_worker::{
    Compositor, JobExecutor, LocalArtifactSink, Pipeline, PipelineError, WorkerConfig,
};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Succeed,
    Fail,
    Hang,
}

struct FakeImages {
    behavior: Behavior,
    fail_on: Option<String>,
    calls: AtomicU32,
}

impl FakeImages {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            fail_on: None,
            calls: AtomicU32::new(0),
        }
    }

    fn failing_on(prompt: &str) -> Self {
        Self {
            behavior: Behavior::Succeed,
            fail_on: Some(prompt.to_string()),
            calls: AtomicU32::new(0),
        }
    }
}

impl Provider for FakeImages {
    fn name(&self) -> &str {
        "fake-images"
    }
}

#[async_trait]
impl ImageProvider for FakeImages {
    async fn generate(&self, request: &ImageRequest) -> ProviderResult<ImageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(request.prompt.as_str()) {
            return Err(ProviderError::BadRequest("prompt rejected".into()));
        }
        match self.behavior {
            Behavior::Succeed => Ok(GenerationResult {
                content: ContentRef::bytes(request.prompt.as_bytes().to_vec(), "image/png"),
                provider: "fake-images".into(),
                cost: 0.01,
                elapsed_ms: 1,
            }),
            Behavior::Fail => Err(ProviderError::Unauthorized("bad key".into())),
            Behavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

struct FakeSpeech;

impl Provider for FakeSpeech {
    fn name(&self) -> &str {
        "fake-speech"
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn generate(&self, request: &SpeechRequest) -> ProviderResult<SpeechResult> {
        Ok(GenerationResult {
            content: ContentRef::bytes(request.text.as_bytes().to_vec(), "audio/mpeg"),
            provider: "fake-speech".into(),
            cost: 0.1,
            elapsed_ms: 1,
        })
    }
}

struct FakeAnalyzer;

impl Provider for FakeAnalyzer {
    fn name(&self) -> &str {
        "fake-analyzer"
    }
}

#[async_trait]
impl ContentAnalyzer for FakeAnalyzer {
    async fn analyze(&self, prompt: &str, max_scenes: usize) -> ProviderResult<Vec<SceneBrief>> {
        Ok((0..max_scenes)
            .map(|i| SceneBrief::new(format!("{} #{}", prompt, i)).with_narration(format!("part {}", i)))
            .collect())
    }
}

/// Compositor that records requests and writes a small file.
struct FakeCompositor {
    name: &'static str,
    dir: std::path::PathBuf,
    available: bool,
    degraded: bool,
    requests: Mutex<Vec<CompositionRequest>>,
}

impl FakeCompositor {
    fn new(name: &'static str, dir: &std::path::Path, available: bool, degraded: bool) -> Self {
        Self {
            name,
            dir: dir.to_path_buf(),
            available,
            degraded,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompositionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Provider for FakeCompositor {
    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl CompositionProvider for FakeCompositor {
    async fn compose(&self, request: &CompositionRequest) -> ProviderResult<CompositionResult> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.available {
            return Err(ProviderError::Unavailable("ffmpeg not found".into()));
        }

        let path = self.dir.join(format!("{}-{}.mp4", self.name, uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"mp4").await.unwrap();
        Ok(CompositionResult {
            artifact: ContentRef::file(&path),
            duration: if self.degraded {
                request.scenes[0].duration
            } else {
                request.total_duration()
            },
            provider: self.name.into(),
            degraded: self.degraded,
            cost: if self.degraded { 0.25 } else { 0.0 },
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    pipeline: Arc<Pipeline>,
    store: Arc<MemoryJobStore>,
    images: Arc<FakeImages>,
    local: Arc<FakeCompositor>,
    hosted: Arc<FakeCompositor>,
    _dir: tempfile::TempDir,
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(1)
        .with_base_delay(Duration::from_millis(1))
}

fn harness(images: FakeImages, local_available: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let images = Arc::new(images);
    let local = Arc::new(FakeCompositor::new("ffmpeg", dir.path(), local_available, false));
    let hosted = Arc::new(FakeCompositor::new("runway", dir.path(), true, true));

    let registry = ProviderRegistry::new(
        vec![images.clone() as Arc<dyn ImageProvider>],
        vec![Arc::new(FakeSpeech) as Arc<dyn SpeechProvider>],
        vec![Arc::new(FakeAnalyzer) as Arc<dyn ContentAnalyzer>],
        Vec::new(),
        fast_policy(),
    );
    let compositor = Compositor::new(
        local.clone(),
        vec![hosted.clone() as Arc<dyn CompositionProvider>],
        &fast_policy(),
        2,
        Duration::from_secs(5),
    );

    let store = Arc::new(MemoryJobStore::default());
    let sink = LocalArtifactSink::new(dir.path().join("artifacts"), None);
    let config = WorkerConfig {
        output_dir: dir.path().to_path_buf(),
        ..WorkerConfig::default()
    };

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(registry),
        Arc::new(compositor),
        store.clone(),
        Arc::new(sink),
        config,
    ));

    Harness {
        pipeline,
        store,
        images,
        local,
        hosted,
        _dir: dir,
    }
}

fn scenes_request(count: usize) -> GenerationRequest {
    let scenes = (0..count)
        .map(|i| {
            SceneBrief::new(format!("scene {}", i))
                .with_narration(format!("narration {}", i))
                .with_subtitle(format!("subtitle {}", i))
        })
        .collect();
    GenerationRequest::new("project-1").with_scenes(scenes)
}

async fn run(h: &Harness, request: &GenerationRequest) -> (JobId, Result<mgen_models::JobResult, PipelineError>) {
    let job_id = JobId::new();
    h.store.create(&job_id).await.unwrap();
    let outcome = h
        .pipeline
        .execute(&job_id, request, &CancellationToken::new())
        .await;
    (job_id, outcome)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_completes_with_explicit_scenes() {
    let h = harness(FakeImages::new(Behavior::Succeed), true);
    let job_id = JobId::new();
    h.store.create(&job_id).await.unwrap();
    let mut events = h.store.subscribe(&job_id).await.unwrap();

    let result = h
        .pipeline
        .execute(&job_id, &scenes_request(3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.provider, "ffmpeg");
    assert!(!result.degraded);
    assert!((result.duration - 15.0).abs() < 1e-9);
    assert!(result.video_url.contains("videos/"));
    assert!(result.thumbnail_url.is_some());

    let snapshot = h.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(snapshot.stage, JobStage::Completed);
    assert_eq!(snapshot.progress, 100);

    // 3 images, 3 narrations, 1 composition; explicit scenes skip analysis.
    let capabilities: Vec<Capability> = snapshot.costs.iter().map(|c| c.capability).collect();
    assert_eq!(capabilities.len(), 7);
    assert_eq!(capabilities.iter().filter(|c| **c == Capability::Image).count(), 3);
    assert_eq!(capabilities.iter().filter(|c| **c == Capability::Speech).count(), 3);
    assert!(!capabilities.contains(&Capability::Analysis));

    // Progress never decreases and stages only move forward.
    let mut last_value = 0;
    let mut last_stage = JobStage::Pending;
    while let Some(event) = events.next().await {
        match event {
            JobEvent::Progress { stage, value, .. } => {
                assert!(value >= last_value, "{} after {}", value, last_value);
                assert!(stage.ordinal() >= last_stage.ordinal());
                last_value = value;
                last_stage = stage;
            }
            JobEvent::Completed { .. } => break,
            JobEvent::Failed { message, .. } => panic!("job failed: {}", message),
            JobEvent::Log { .. } => {}
        }
    }
    assert_eq!(last_stage, JobStage::Finalizing);

    let composed = h.local.requests();
    assert_eq!(composed.len(), 1);
    assert_eq!(composed[0].scenes.len(), 3);
    assert_eq!(composed[0].audio.len(), 3);
    // Subtitles are off by default.
    assert!(composed[0].scenes.iter().all(|s| s.subtitle.is_none()));
    // Every scene carries the configured transition, the first included.
    assert!(composed[0].scenes.iter().all(|s| s.transition == TransitionKind::Fade));
}

#[tokio::test]
async fn test_prompt_is_analyzed_into_scenes() {
    let h = harness(FakeImages::new(Behavior::Succeed), true);
    let request = GenerationRequest::new("project-1").with_prompt("a lighthouse at dusk");

    let (job_id, outcome) = run(&h, &request).await;
    outcome.unwrap();

    assert_eq!(h.images.calls.load(Ordering::SeqCst), 3);
    let snapshot = h.store.get(&job_id).await.unwrap().unwrap();
    let analysis: Vec<_> = snapshot
        .costs
        .iter()
        .filter(|c| c.capability == Capability::Analysis)
        .collect();
    assert_eq!(analysis.len(), 1);
    assert_eq!(analysis[0].provider, "fake-analyzer");
}

#[tokio::test]
async fn test_audio_disabled_is_skipped() {
    let h = harness(FakeImages::new(Behavior::Succeed), true);
    let options = GenerationOptions {
        with_audio: false,
        with_subtitles: true,
        ..GenerationOptions::default()
    };
    let request = scenes_request(2).with_options(options);

    let job_id = JobId::new();
    h.store.create(&job_id).await.unwrap();
    let mut events = h.store.subscribe(&job_id).await.unwrap();
    h.pipeline
        .execute(&job_id, &request, &CancellationToken::new())
        .await
        .unwrap();

    let mut skipped = false;
    while let Some(event) = events.next().await {
        if let JobEvent::Progress {
            stage: JobStage::GeneratingAudio,
            data,
            ..
        } = &event
        {
            skipped |= data.get("skipped") == Some(&serde_json::Value::Bool(true));
        }
        if event.is_terminal() {
            break;
        }
    }
    assert!(skipped);

    let composed = h.local.requests();
    assert!(composed[0].audio.is_empty());
    assert_eq!(composed[0].scenes[1].subtitle.as_deref(), Some("subtitle 1"));
}

#[tokio::test]
async fn test_item_failure_fails_job_and_keeps_costs() {
    let h = harness(FakeImages::failing_on("scene 1"), true);

    let (job_id, outcome) = run(&h, &scenes_request(3)).await;
    let err = outcome.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageJoin {
            stage: JobStage::GeneratingImages,
            index: 1,
            total: 3,
            ..
        }
    ));

    let snapshot = h.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(snapshot.stage, JobStage::Failed);
    let error = snapshot.error.clone().unwrap();
    assert_eq!(error.stage, JobStage::GeneratingImages);
    assert_eq!(error.message, err.to_string());
    assert!(snapshot.costs.len() <= 2);
    assert!(h.local.requests().is_empty());

    let view = mgen_models::JobView::from(snapshot);
    assert_eq!(view.status, ViewStatus::Failed);
    assert_eq!(view.stage, Some(JobStage::GeneratingImages));
    assert_eq!(view.error, Some(err.to_string()));
}

#[tokio::test]
async fn test_hosted_fallback_is_degraded() {
    let h = harness(FakeImages::new(Behavior::Succeed), false);

    let (job_id, outcome) = run(&h, &scenes_request(3)).await;
    let result = outcome.unwrap();

    assert!(result.degraded);
    assert_eq!(result.provider, "runway");
    assert!((result.duration - 5.0).abs() < 1e-9);
    // Unavailable is fatal: no retries on the local renderer.
    assert_eq!(h.local.requests().len(), 1);
    assert_eq!(h.hosted.requests().len(), 1);

    let view = mgen_models::JobView::from(h.store.get(&job_id).await.unwrap().unwrap());
    assert_eq!(view.status, ViewStatus::Completed);
    assert!(view.result.unwrap().degraded);
}

#[tokio::test]
async fn test_fatal_provider_error_is_not_retried() {
    let h = harness(FakeImages::new(Behavior::Fail), true);

    let (_, outcome) = run(&h, &scenes_request(1)).await;
    assert!(outcome.is_err());
    assert_eq!(h.images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_mid_stage() {
    let h = harness(FakeImages::new(Behavior::Hang), true);
    let job_id = JobId::new();
    h.store.create(&job_id).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h
        .pipeline
        .execute(&job_id, &scenes_request(2), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));

    let snapshot = h.store.get(&job_id).await.unwrap().unwrap();
    let error = snapshot.error.unwrap();
    assert_eq!(error.message, "cancelled");
    assert_eq!(error.stage, JobStage::GeneratingImages);
}

#[tokio::test]
async fn test_executor_runs_and_reports_status() {
    let h = harness(FakeImages::new(Behavior::Succeed), true);
    let executor = JobExecutor::new(h.pipeline.clone());

    let job_id = executor.submit(scenes_request(2)).await.unwrap();
    let view = executor.status(&job_id).await.unwrap();
    assert!(matches!(view.status, ViewStatus::Pending | ViewStatus::Processing | ViewStatus::Completed));

    executor.shutdown().await;
    let view = executor.status(&job_id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Completed);
    assert_eq!(view.progress, 100);

    assert!(matches!(
        executor.submit(scenes_request(1)).await,
        Err(PipelineError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_executor_cancel() {
    let h = harness(FakeImages::new(Behavior::Hang), true);
    let executor = JobExecutor::new(h.pipeline.clone());

    let job_id = executor.submit(scenes_request(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(executor.cancel(&job_id));
    executor.shutdown().await;

    let view = executor.status(&job_id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("cancelled"));
    assert_eq!(
        executor.tracker_status(&job_id),
        Some(mgen_store::TrackerStatus::Revoked)
    );
    assert!(!executor.cancel(&job_id));
    assert!(!executor.cancel(&JobId::new()));
}

#[tokio::test]
async fn test_submit_rejects_empty_request() {
    let h = harness(FakeImages::new(Behavior::Succeed), true);
    let executor = JobExecutor::new(h.pipeline.clone());

    let err = executor
        .submit(GenerationRequest::new("project-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
}
