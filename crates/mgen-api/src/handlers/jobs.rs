//! Content generation job handlers.
//!
//! Provides REST API endpoints for:
//! - Submitting a generation job
//! - Polling job status
//! - Requesting cancellation

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use mgen_models::{GenerationRequest, JobId, JobView, ViewStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Response to an accepted submission.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: JobId,
    pub status: ViewStatus,
    /// Rough wall-clock estimate in seconds
    pub estimated_duration: u64,
}

/// Response to a cancellation request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    /// False when the job had already finished
    pub cancelled: bool,
    pub status: ViewStatus,
}

/// Parse and check a job id taken from the path.
pub fn parse_job_id(raw: String) -> ApiResult<JobId> {
    let job_id = JobId::from_string(raw);
    if !job_id.is_well_formed() {
        return Err(ApiError::bad_request(
            "job id must be 8-64 alphanumeric or '-' characters",
        ));
    }
    Ok(job_id)
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a content generation job.
///
/// POST /api/content/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    request.validate()?;

    let estimated_duration = request.estimated_duration_secs();
    let job_id = state.executor.submit(request).await?;

    info!(job_id = %job_id, estimated_duration, "Accepted generation job");

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id,
            status: ViewStatus::Pending,
            estimated_duration,
        }),
    ))
}

/// Current job status.
///
/// GET /api/content/status/:job_id
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = parse_job_id(job_id)?;

    let view = state
        .executor
        .status(&job_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("job {}", job_id)))?;

    if view.status == ViewStatus::StoreUnavailable {
        return Err(ApiError::StoreUnavailable(
            view.error.unwrap_or_else(|| "state store unreachable".to_string()),
        ));
    }

    Ok(Json(view))
}

/// Best-effort cancellation.
///
/// POST /api/content/:job_id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job_id = parse_job_id(job_id)?;

    let cancelled = state.executor.cancel(&job_id);
    let view = state.executor.status(&job_id).await;

    let status = match view {
        Some(view) => view.status,
        None if cancelled => ViewStatus::Processing,
        None => return Err(ApiError::not_found(format!("job {}", job_id))),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            cancelled,
            status,
        }),
    ))
}
