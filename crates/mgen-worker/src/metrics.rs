//! Pipeline metrics.

use metrics::{counter, gauge, histogram};

pub mod names {
    /// Jobs accepted by the executor.
    pub const JOBS_SUBMITTED_TOTAL: &str = "mgen_jobs_submitted_total";

    /// Jobs that reached `completed`, by composition provider.
    pub const JOBS_COMPLETED_TOTAL: &str = "mgen_jobs_completed_total";

    /// Jobs that reached `failed`, by stage.
    pub const JOBS_FAILED_TOTAL: &str = "mgen_jobs_failed_total";

    /// Jobs currently running.
    pub const JOBS_IN_FLIGHT: &str = "mgen_jobs_in_flight";

    /// Wall-clock time per stage in seconds.
    pub const STAGE_DURATION_SECONDS: &str = "mgen_stage_duration_seconds";

    /// Provider spend per job.
    pub const JOB_COST: &str = "mgen_job_cost";
}

pub fn record_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_completed(provider: &str, degraded: bool) {
    counter!(
        names::JOBS_COMPLETED_TOTAL,
        "provider" => provider.to_string(),
        "degraded" => degraded.to_string()
    )
    .increment(1);
}

pub fn record_failed(stage: &str) {
    counter!(names::JOBS_FAILED_TOTAL, "stage" => stage.to_string()).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_stage_duration(stage: &str, secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.to_string()).record(secs);
}

pub fn record_job_cost(amount: f64) {
    histogram!(names::JOB_COST).record(amount);
}
