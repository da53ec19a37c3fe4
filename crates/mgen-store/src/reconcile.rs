//! Merge the task tracker's view with the state store's.
//!
//! The store is the source of truth. The tracker only fills in for jobs
//! whose snapshot is missing.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use mgen_models::{JobId, JobSnapshot, JobView, ViewStatus};

use crate::error::StoreResult;

/// Coarse task state known to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    Revoked,
}

/// Build the answer to a status query.
///
/// Returns `None` when neither source knows the job. A store that cannot be
/// reached yields `store_unavailable`; any other store error (an unreadable
/// snapshot, say) yields a failed view.
pub fn reconcile(
    job_id: &JobId,
    tracker: Option<TrackerStatus>,
    store: StoreResult<Option<JobSnapshot>>,
) -> Option<JobView> {
    match store {
        Ok(Some(snapshot)) => Some(snapshot.into()),
        Err(e) if e.is_unavailable() => {
            Some(view(job_id, ViewStatus::StoreUnavailable, 0, Some(e.to_string())))
        }
        Err(e) => Some(view(job_id, ViewStatus::Failed, 0, Some(e.to_string()))),
        Ok(None) => tracker.map(|status| {
            let (status, progress, error) = match status {
                TrackerStatus::Pending => (ViewStatus::Pending, 0, None),
                TrackerStatus::Started => (ViewStatus::Processing, 50, None),
                TrackerStatus::Succeeded => (ViewStatus::Completed, 100, None),
                TrackerStatus::Failed => (ViewStatus::Failed, 0, Some("job failed")),
                TrackerStatus::Revoked => (ViewStatus::Failed, 0, Some("job revoked")),
            };
            view(job_id, status, progress, error.map(str::to_string))
        }),
    }
}

fn view(job_id: &JobId, status: ViewStatus, progress: u8, error: Option<String>) -> JobView {
    JobView {
        job_id: job_id.clone(),
        status,
        stage: None,
        progress,
        data: Map::new(),
        result: None,
        error,
        costs: Vec::new(),
    }
}
