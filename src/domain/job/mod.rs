pub mod error;
pub mod model;
pub mod orchestrator;
pub mod service;
pub mod worker;

pub use error::JobServiceError;
pub use model::{
    resolve_cells, settle, AudioAsset, Cell, CellCounts, CellFailure, CellKey, CellOutcome,
    CellOutput, CreativeAngle, Job, JobLogEntry, JobScripts, JobState, JobSummary, SegmentHandle,
    Stage, Variant, VariantScript,
};
pub use orchestrator::{Estimate, Orchestrator, PipelineSettings};
pub use service::{JobService, JobServiceApi};
pub use worker::{CancellationRegistry, QueuedJob, WorkerPool};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response for a submitted job
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub id: Uuid,
    pub state: JobState,
}

/// Response for a cancellation request
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: Uuid,
    pub state: JobState,
    /// False when the job had already reached a terminal state
    pub cancelled: bool,
}

/// Everything a caller can learn about a job while it runs
#[derive(Debug, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub title: String,
    pub state: JobState,
    pub progress: u8,
    pub counts: CellCounts,
    /// Most recent log entries, oldest first
    pub log: Vec<JobLogEntry>,
    pub log_total: usize,
    pub cells: Vec<Cell>,
    pub scripts: JobScripts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn from_job(job: Job, log_tail: usize) -> Self {
        let progress = job.progress();
        let counts = job.counts();
        let log_total = job.log.len();
        let log = job.log[log_total.saturating_sub(log_tail)..].to_vec();

        Self {
            id: job.id,
            title: job.request.title,
            state: job.state,
            progress,
            counts,
            log,
            log_total,
            cells: job.cells,
            scripts: job.scripts,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
