//! Provider clients against a mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mgen_models::{
    CompositionRequest, ContentRef, EmotionTone, ImageRequest, ImageStyle, Scene, SpeechRequest,
    VoiceGender,
};
use mgen_providers::{
    ApiEndpoint, CompositionProvider, ContentAnalyzer, ElevenLabsClient, HostedService,
    HostedVideoClient, ImageProvider, OpenAiAnalyzer, Provider, ProviderError, ReplicateClient,
    SpeechProvider, StabilityClient,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn endpoint(server: &MockServer) -> ApiEndpoint {
    ApiEndpoint::new(Some("test-key".to_string()), server.uri())
}

fn image_request() -> ImageRequest {
    ImageRequest::new("a lighthouse at night", ImageStyle::Cinematic, 1280, 720)
}

#[tokio::test]
async fn test_replicate_polls_until_succeeded() {
    let server = MockServer::start().await;
    let poll_url = format!("{}/v1/predictions/p1", server.uri());

    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .and(header("Prefer", "wait"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1",
            "status": "processing",
            "urls": { "get": poll_url }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://replicate.delivery/out-0.png"]
        })))
        .mount(&server)
        .await;

    let client = ReplicateClient::new(endpoint(&server), TIMEOUT)
        .unwrap()
        .with_polling(Duration::from_millis(10), 5);
    let result = client.generate(&image_request()).await.unwrap();

    assert_eq!(result.provider, "replicate");
    assert_eq!(result.content.as_url(), Some("https://replicate.delivery/out-0.png"));
    assert!((result.cost - 0.005).abs() < 1e-9);
}

#[tokio::test]
async fn test_replicate_failed_prediction_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p2",
            "status": "failed",
            "error": "CUDA out of memory"
        })))
        .mount(&server)
        .await;

    let client = ReplicateClient::new(endpoint(&server), TIMEOUT).unwrap();
    let err = client.generate(&image_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::GenerationFailed(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unconfigured_client_fails_fast() {
    let client = ReplicateClient::new(ApiEndpoint::new(None, "http://127.0.0.1:9"), TIMEOUT).unwrap();
    assert!(!client.is_configured());

    let err = client.generate(&image_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unconfigured(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_stability_decodes_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image",
        ))
        .and(body_partial_json(json!({ "cfg_scale": 7, "steps": 30, "samples": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{ "base64": "iVBORw0K", "finishReason": "SUCCESS" }]
        })))
        .mount(&server)
        .await;

    let client = StabilityClient::new(endpoint(&server), TIMEOUT).unwrap();
    let result = client.generate(&image_request()).await.unwrap();

    match result.content {
        ContentRef::Bytes { data, mime } => {
            assert_eq!(mime, "image/png");
            assert_eq!(&data[..4], b"\x89PNG");
        }
        other => panic!("expected inline bytes, got {other:?}"),
    }
    assert!((result.cost - 0.04).abs() < 1e-9);
}

#[tokio::test]
async fn test_stability_status_classification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = StabilityClient::new(endpoint(&server), TIMEOUT).unwrap();

    let first = client.generate(&image_request()).await.unwrap_err();
    assert!(matches!(first, ProviderError::RateLimited(_)));
    assert!(first.is_retryable());

    let second = client.generate(&image_request()).await.unwrap_err();
    assert!(matches!(second, ProviderError::Unauthorized(_)));
    assert!(!second.is_retryable());
}

#[tokio::test]
async fn test_elevenlabs_returns_inline_audio() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/pNInz6obpgDQGcFmaJgB"))
        .and(header("xi-api-key", "test-key"))
        .and(body_partial_json(json!({ "model_id": "eleven_multilingual_v2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]),
        )
        .mount(&server)
        .await;

    let client = ElevenLabsClient::new(endpoint(&server), TIMEOUT).unwrap();
    let text = "x".repeat(2000);
    let result = client
        .generate(&SpeechRequest::new(text, VoiceGender::Male, EmotionTone::Calm))
        .await
        .unwrap();

    assert_eq!(result.content.extension_hint(), "mp3");
    assert!((result.cost - 0.60).abs() < 1e-9);
}

#[tokio::test]
async fn test_elevenlabs_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = ElevenLabsClient::new(endpoint(&server), TIMEOUT).unwrap();
    let err = client
        .generate(&SpeechRequest::new("hello", VoiceGender::Female, EmotionTone::Friendly))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_openai_analyzer_parses_scenes() {
    let server = MockServer::start().await;
    let storyboard = json!({
        "scenes": [
            { "prompt": "sunrise over hills", "narration": "A new day." },
            { "prompt": "busy market", "narration": "The town wakes." }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": storyboard.to_string() } }]
        })))
        .mount(&server)
        .await;

    let analyzer = OpenAiAnalyzer::new(endpoint(&server), TIMEOUT).unwrap();
    let scenes = analyzer.analyze("a day in a small town", 5).await.unwrap();

    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].prompt, "sunrise over hills");
    assert_eq!(scenes[1].narration.as_deref(), Some("The town wakes."));
}

#[tokio::test]
async fn test_hosted_runway_is_degraded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/image-to-video"))
        .and(body_partial_json(json!({ "image": "https://cdn/a.png", "duration": 5 })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "video_url": "https://runway/v.mp4" })),
        )
        .mount(&server)
        .await;

    let client = HostedVideoClient::new(HostedService::Runway, endpoint(&server), TIMEOUT).unwrap();
    let request = CompositionRequest::new(
        vec![
            Scene::new(ContentRef::url("https://cdn/a.png"), 5.0),
            Scene::new(ContentRef::url("https://cdn/b.png"), 5.0),
        ],
        1280,
        720,
    );
    let result = client.compose(&request).await.unwrap();

    assert!(result.degraded);
    assert_eq!(result.provider, "runway");
    assert_eq!(result.duration, 5.0);
    assert!((result.cost - 0.25).abs() < 1e-9);
    assert_eq!(result.artifact.as_url(), Some("https://runway/v.mp4"));
}

#[tokio::test]
async fn test_hosted_pika_missing_video_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let client = HostedVideoClient::new(HostedService::Pika, endpoint(&server), TIMEOUT).unwrap();
    let request = CompositionRequest::new(
        vec![Scene::new(ContentRef::url("https://cdn/a.png"), 4.0)],
        1280,
        720,
    );
    let err = client.compose(&request).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}
