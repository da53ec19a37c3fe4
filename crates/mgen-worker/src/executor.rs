//! Job executor.
//!
//! Accepts submissions, runs each job as its own task behind a concurrency
//! limit and tracks coarse task status for status reconciliation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use mgen_models::{GenerationRequest, JobId, JobView};
use mgen_store::{reconcile, TrackerStatus};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::pipeline::Pipeline;

/// Finished jobs remembered for status lookups after their snapshot expires.
const FINISHED_RETENTION: usize = 1024;

/// Grace period for cancelled jobs to record their failure at shutdown.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

struct TrackedJob {
    cancel: CancellationToken,
    status: TrackerStatus,
}

#[derive(Default)]
struct TrackerState {
    jobs: HashMap<JobId, TrackedJob>,
    finished: VecDeque<JobId>,
}

/// In-process task tracker.
#[derive(Default)]
struct Tracker {
    state: Mutex<TrackerState>,
}

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, job_id: JobId, cancel: CancellationToken) {
        self.lock().jobs.insert(
            job_id,
            TrackedJob {
                cancel,
                status: TrackerStatus::Pending,
            },
        );
    }

    fn start(&self, job_id: &JobId) {
        if let Some(job) = self.lock().jobs.get_mut(job_id) {
            job.status = TrackerStatus::Started;
        }
    }

    fn finish(&self, job_id: &JobId, status: TrackerStatus) {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = status;
        }
        state.finished.push_back(job_id.clone());
        while state.finished.len() > FINISHED_RETENTION {
            if let Some(oldest) = state.finished.pop_front() {
                state.jobs.remove(&oldest);
            }
        }
    }

    fn status(&self, job_id: &JobId) -> Option<TrackerStatus> {
        self.lock().jobs.get(job_id).map(|job| job.status)
    }

    /// Cancel a job that has not finished yet.
    fn cancel(&self, job_id: &JobId) -> bool {
        match self.lock().jobs.get(job_id) {
            Some(job) if is_active(job.status) => {
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let state = self.lock();
        let mut cancelled = 0;
        for job in state.jobs.values().filter(|job| is_active(job.status)) {
            job.cancel.cancel();
            cancelled += 1;
        }
        cancelled
    }

    fn active(&self) -> usize {
        self.lock()
            .jobs
            .values()
            .filter(|job| is_active(job.status))
            .count()
    }
}

fn is_active(status: TrackerStatus) -> bool {
    matches!(status, TrackerStatus::Pending | TrackerStatus::Started)
}

/// Runs submitted jobs on the tokio runtime.
pub struct JobExecutor {
    pipeline: Arc<Pipeline>,
    job_semaphore: Arc<Semaphore>,
    tracker: Arc<Tracker>,
    tasks: TaskTracker,
    accepting: AtomicBool,
}

impl JobExecutor {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let max_jobs = pipeline.config().max_concurrent_jobs.max(1);
        info!(max_concurrent_jobs = max_jobs, "Starting job executor");

        Self {
            pipeline,
            job_semaphore: Arc::new(Semaphore::new(max_jobs)),
            tracker: Arc::new(Tracker::default()),
            tasks: TaskTracker::new(),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Create the job and start it in the background.
    ///
    /// Returns as soon as the pending snapshot is stored.
    pub async fn submit(&self, request: GenerationRequest) -> PipelineResult<JobId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(PipelineError::ShuttingDown);
        }
        if !request.has_content() {
            return Err(PipelineError::invalid_request(
                "a prompt or explicit scenes are required",
            ));
        }

        let job_id = JobId::new();
        self.pipeline.store().create(&job_id).await?;

        let cancel = CancellationToken::new();
        self.tracker.insert(job_id.clone(), cancel.clone());
        metrics::record_submitted();
        info!(job_id = %job_id, project_id = %request.project_id, "Job submitted");

        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);
        let tracker = Arc::clone(&self.tracker);
        let id = job_id.clone();

        self.tasks.spawn(async move {
            // A job cancelled while queued still runs, and fails at once.
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = cancel.cancelled() => None,
            };

            tracker.start(&id);
            metrics::set_in_flight(tracker.active());

            let outcome = pipeline.execute(&id, &request, &cancel).await;
            drop(permit);

            let status = match &outcome {
                Ok(_) => TrackerStatus::Succeeded,
                Err(PipelineError::Cancelled) => TrackerStatus::Revoked,
                Err(_) => TrackerStatus::Failed,
            };
            tracker.finish(&id, status);
            metrics::set_in_flight(tracker.active());
        });

        Ok(job_id)
    }

    /// Request cancellation. Returns false when the job is not running here.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let cancelled = self.tracker.cancel(job_id);
        if cancelled {
            info!(job_id = %job_id, "Job cancellation requested");
        }
        cancelled
    }

    pub fn tracker_status(&self, job_id: &JobId) -> Option<TrackerStatus> {
        self.tracker.status(job_id)
    }

    /// Current view of a job, reconciled between store and tracker.
    pub async fn status(&self, job_id: &JobId) -> Option<JobView> {
        let stored = self.pipeline.store().get(job_id).await;
        reconcile(job_id, self.tracker_status(job_id), stored)
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.active()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait for in-flight ones.
    ///
    /// Jobs still running after the shutdown timeout are cancelled.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.tasks.close();

        let timeout = self.pipeline.config().shutdown_timeout;
        info!(in_flight = self.in_flight(), "Waiting for in-flight jobs to complete...");

        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            let cancelled = self.tracker.cancel_all();
            warn!(cancelled, "Shutdown timeout elapsed, cancelling remaining jobs");
            let _ = tokio::time::timeout(CANCEL_GRACE, self.tasks.wait()).await;
        }

        info!("Job executor stopped");
    }
}
