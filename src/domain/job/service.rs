use super::error::JobServiceError;
use super::orchestrator::{Estimate, Orchestrator};
use super::worker::{CancellationRegistry, QueuedJob};
use super::{CancelResponse, Job, JobAccepted, JobLogEntry, JobSnapshot, JobState, JobSummary, Stage};
use crate::domain::generation::GenerationRequest;
use crate::infrastructure::repositories::JobRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

pub const MAX_RECENT_JOBS: usize = 50;

pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    orchestrator: Arc<Orchestrator>,
    queue: mpsc::Sender<QueuedJob>,
    registry: Arc<CancellationRegistry>,
    default_log_tail: usize,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        orchestrator: Arc<Orchestrator>,
        queue: mpsc::Sender<QueuedJob>,
        registry: Arc<CancellationRegistry>,
        default_log_tail: usize,
    ) -> Self {
        Self {
            jobs,
            orchestrator,
            queue,
            registry,
            default_log_tail,
        }
    }
}

#[async_trait]
pub trait JobServiceApi: Send + Sync {
    /// Validate, persist and enqueue a request. Returns as soon as the job is queued.
    async fn submit(&self, request: GenerationRequest) -> Result<JobAccepted, JobServiceError>;

    /// Current state, the last `log_tail` log entries and every cell so far
    async fn poll(&self, id: Uuid, log_tail: Option<usize>) -> Result<JobSnapshot, JobServiceError>;

    /// Stop a queued or running job.
    ///
    /// A queued job fails immediately. A running job stops issuing work and
    /// is finalized by its worker, keeping the cells already produced.
    async fn cancel(&self, id: Uuid) -> Result<CancelResponse, JobServiceError>;

    /// Collaborator call volume the request would cause
    async fn estimate(&self, request: &GenerationRequest) -> Result<Estimate, JobServiceError>;

    /// Newest first, at most 50
    async fn list_recent(&self, limit: usize) -> Result<Vec<JobSummary>, JobServiceError>;
}

#[async_trait]
impl JobServiceApi for JobService {
    async fn submit(&self, request: GenerationRequest) -> Result<JobAccepted, JobServiceError> {
        request.validate().map_err(JobServiceError::Invalid)?;

        let job = Job::new(request);
        let id = job.id;
        self.jobs.insert(&job).await?;
        let cancel = self.registry.register(id).await;

        if let Err(e) = self.queue.try_send(QueuedJob { id, cancel }) {
            let reason = match e {
                TrySendError::Full(_) => "job queue is full",
                TrySendError::Closed(_) => "job queue is closed",
            };
            tracing::warn!(job_id = %id, reason, "Rejecting job");
            self.registry.remove(id).await;
            self.jobs
                .append_log(id, &JobLogEntry {
                    error: Some(reason.to_string()),
                    ..JobLogEntry::info(Stage::Queue, "Job could not be queued")
                })
                .await?;
            self.jobs
                .transition(id, JobState::Queued, JobState::Failed)
                .await?;
            return Err(JobServiceError::QueueUnavailable);
        }

        tracing::info!(
            job_id = %id,
            title = %job.request.title,
            variant_count = job.request.variant_count,
            languages = job.request.target_languages.len(),
            "Job submitted"
        );

        Ok(JobAccepted {
            id,
            state: JobState::Queued,
        })
    }

    async fn poll(&self, id: Uuid, log_tail: Option<usize>) -> Result<JobSnapshot, JobServiceError> {
        let job = self.find(id).await?;
        Ok(JobSnapshot::from_job(
            job,
            log_tail.unwrap_or(self.default_log_tail),
        ))
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelResponse, JobServiceError> {
        let job = self.find(id).await?;
        if job.state.is_terminal() {
            return Ok(CancelResponse {
                id,
                state: job.state,
                cancelled: false,
            });
        }

        let owned = self.registry.cancel(id).await;

        if job.state == JobState::Queued
            && self
                .jobs
                .transition(id, JobState::Queued, JobState::Failed)
                .await?
        {
            self.jobs
                .append_log(id, &JobLogEntry::info(Stage::Queue, "Job cancelled before start"))
                .await?;
            tracing::info!(job_id = %id, "Queued job cancelled");
            return Ok(CancelResponse {
                id,
                state: JobState::Failed,
                cancelled: true,
            });
        }

        if owned {
            self.jobs
                .append_log(
                    id,
                    &JobLogEntry::info(Stage::Finalize, "Cancellation requested, stopping new work"),
                )
                .await?;
            tracing::info!(job_id = %id, "Running job cancellation requested");
            return Ok(CancelResponse {
                id,
                state: JobState::Running,
                cancelled: true,
            });
        }

        // no worker in this process owns the job, so nobody else will finalize it
        if self
            .jobs
            .transition(id, JobState::Running, JobState::Failed)
            .await?
        {
            self.jobs
                .append_log(
                    id,
                    &JobLogEntry::info(Stage::Finalize, "Orphaned job cancelled"),
                )
                .await?;
            tracing::warn!(job_id = %id, "Cancelled running job with no local worker");
            return Ok(CancelResponse {
                id,
                state: JobState::Failed,
                cancelled: true,
            });
        }

        let current = self.find(id).await?;
        Ok(CancelResponse {
            id,
            state: current.state,
            cancelled: false,
        })
    }

    async fn estimate(&self, request: &GenerationRequest) -> Result<Estimate, JobServiceError> {
        request.validate().map_err(JobServiceError::Invalid)?;
        Ok(self.orchestrator.estimate(request)?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<JobSummary>, JobServiceError> {
        Ok(self.jobs.list_recent(limit.clamp(1, MAX_RECENT_JOBS)).await?)
    }
}

impl JobService {
    async fn find(&self, id: Uuid) -> Result<Job, JobServiceError> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or(JobServiceError::NotFound)
    }
}
