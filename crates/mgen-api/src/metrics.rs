//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mgen_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mgen_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "mgen_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "mgen_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "mgen_ws_messages_sent_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(opened: bool) {
    if opened {
        counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);
    } else {
        gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent() {
    counter!(names::WS_MESSAGES_SENT).increment(1);
}

/// Replace job ids in known routes so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let sanitized: Vec<&str> = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let prev = if i > 0 { segments[i - 1] } else { "" };
            let next = segments.get(i + 1).copied().unwrap_or("");
            let is_job_slot = (prev == "status" || prev == "jobs")
                || (next == "cancel" && prev == "content");
            if is_job_slot && !segment.is_empty() {
                ":job_id"
            } else {
                segment
            }
        })
        .collect();
    sanitized.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/content/status/550e8400-e29b-41d4-a716-446655440000"),
            "/api/content/status/:job_id"
        );
        assert_eq!(
            sanitize_path("/api/content/550e8400-e29b/cancel"),
            "/api/content/:job_id/cancel"
        );
        assert_eq!(sanitize_path("/ws/jobs/abcdef123"), "/ws/jobs/:job_id");
        assert_eq!(sanitize_path("/api/content/generate"), "/api/content/generate");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
