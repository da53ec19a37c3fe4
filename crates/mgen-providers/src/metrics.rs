//! Provider metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Provider call attempts by provider and capability.
    pub const ATTEMPTS_TOTAL: &str = "mgen_provider_attempts_total";

    /// Failed provider attempts by provider, capability and error kind.
    pub const FAILURES_TOTAL: &str = "mgen_provider_failures_total";

    /// Fallbacks from one provider to the next.
    pub const FALLBACKS_TOTAL: &str = "mgen_provider_fallbacks_total";

    /// Successful call latency in seconds.
    pub const LATENCY_SECONDS: &str = "mgen_provider_latency_seconds";
}

pub fn record_attempt(provider: &str, capability: &str) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "provider" => provider.to_string(),
        "capability" => capability.to_string()
    )
    .increment(1);
}

pub fn record_failure(provider: &str, capability: &str, kind: &str) {
    counter!(
        names::FAILURES_TOTAL,
        "provider" => provider.to_string(),
        "capability" => capability.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_fallback(capability: &str) {
    counter!(names::FALLBACKS_TOTAL, "capability" => capability.to_string()).increment(1);
}

pub fn record_latency(provider: &str, capability: &str, secs: f64) {
    histogram!(
        names::LATENCY_SECONDS,
        "provider" => provider.to_string(),
        "capability" => capability.to_string()
    )
    .record(secs);
}
