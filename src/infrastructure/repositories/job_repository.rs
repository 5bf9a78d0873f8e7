use crate::domain::job::{
    Cell, CellKey, CellOutcome, Job, JobLogEntry, JobScripts, JobState, JobSummary,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence for jobs, their log and their cells.
///
/// Writers are limited to the orchestrator working a job and the service
/// cancelling one. Implementations must make `transition` a compare-and-set
/// and `fill_cell` a fill-once write so concurrent cells cannot clobber
/// each other.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// Newest first
    async fn list_recent(&self, limit: usize) -> AppResult<Vec<JobSummary>>;

    /// Move `id` from `from` to `to`. Returns false when the job was not in `from`.
    async fn transition(&self, id: Uuid, from: JobState, to: JobState) -> AppResult<bool>;

    async fn append_log(&self, id: Uuid, entry: &JobLogEntry) -> AppResult<()>;

    /// Record the expected cells, all pending. Allowed once per job.
    async fn resolve_cells(&self, id: Uuid, cells: &[CellKey]) -> AppResult<()>;

    /// Settle a pending cell. Returns false if the cell was already settled.
    async fn fill_cell(&self, id: Uuid, key: &CellKey, outcome: &CellOutcome) -> AppResult<bool>;

    async fn save_scripts(&self, id: Uuid, scripts: &JobScripts) -> AppResult<()>;
}

pub(crate) fn check_transition(from: JobState, to: JobState) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "job cannot move from {} to {}",
            from, to
        )))
    }
}

pub(crate) fn check_fill(outcome: &CellOutcome) -> AppResult<()> {
    if outcome.is_pending() {
        return Err(AppError::BadRequest(
            "a cell can only be filled with a final outcome".to_string(),
        ));
    }
    Ok(())
}

/// Process-local job store used when no database is configured
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("job {} not found", id))
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<JobSummary>> {
        let jobs = self.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs.values().map(JobSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn transition(&self, id: Uuid, from: JobState, to: JobState) -> AppResult<bool> {
        check_transition(from, to)?;
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        if job.state != from {
            return Ok(false);
        }
        job.state = to;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_log(&self, id: Uuid, entry: &JobLogEntry) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        job.log.push(entry.clone());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn resolve_cells(&self, id: Uuid, cells: &[CellKey]) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        if !job.cells.is_empty() {
            return Err(AppError::Conflict(format!("cells for job {} already resolved", id)));
        }
        job.cells = cells
            .iter()
            .map(|key| Cell {
                key: key.clone(),
                outcome: CellOutcome::Pending,
            })
            .collect();
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn fill_cell(&self, id: Uuid, key: &CellKey, outcome: &CellOutcome) -> AppResult<bool> {
        check_fill(outcome)?;
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        let cell = job
            .cells
            .iter_mut()
            .find(|cell| &cell.key == key)
            .ok_or_else(|| AppError::NotFound(format!("cell {} not resolved for job {}", key, id)))?;
        if !cell.outcome.is_pending() {
            return Ok(false);
        }
        cell.outcome = outcome.clone();
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn save_scripts(&self, id: Uuid, scripts: &JobScripts) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        job.scripts = scripts.clone();
        job.updated_at = Utc::now();
        Ok(())
    }
}
