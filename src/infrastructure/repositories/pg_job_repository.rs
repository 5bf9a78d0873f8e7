use super::job_repository::{check_fill, check_transition, JobRepository};
use crate::domain::generation::{GenerationRequest, LanguageCode};
use crate::domain::job::{
    Cell, CellKey, CellOutcome, Job, JobLogEntry, JobScripts, JobState, JobSummary, Stage,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    request: Json<GenerationRequest>,
    state: String,
    scripts: Json<JobScripts>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct LogRow {
    logged_at: DateTime<Utc>,
    stage: String,
    message: String,
    error: Option<String>,
}

#[derive(FromRow)]
struct CellRow {
    variant: i32,
    language: String,
    outcome: Json<CellOutcome>,
}

fn parse_state(value: &str) -> AppResult<JobState> {
    JobState::parse(value).ok_or_else(|| AppError::Internal(format!("unknown job state '{}'", value)))
}

impl TryFrom<LogRow> for JobLogEntry {
    type Error = AppError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let stage = Stage::parse(&row.stage)
            .ok_or_else(|| AppError::Internal(format!("unknown stage '{}'", row.stage)))?;
        Ok(JobLogEntry {
            timestamp: row.logged_at,
            stage,
            message: row.message,
            error: row.error,
        })
    }
}

impl TryFrom<CellRow> for Cell {
    type Error = AppError;

    fn try_from(row: CellRow) -> Result<Self, Self::Error> {
        let language = LanguageCode::parse(&row.language).map_err(AppError::Internal)?;
        Ok(Cell {
            key: CellKey::new(row.variant as u32, language),
            outcome: row.outcome.0,
        })
    }
}

/// Postgres-backed job store
pub struct PgJobRepository {
    pool: Arc<DbPool>,
}

impl PgJobRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &Job) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, request, state, scripts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(Json(&job.request))
        .bind(job.state.as_str())
        .bind(Json(&job.scripts))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return AppError::Conflict(format!("job {} already exists", job.id));
                }
            }
            AppError::Database(e)
        })?;

        for entry in &job.log {
            sqlx::query(
                r#"
                INSERT INTO job_log (job_id, logged_at, stage, message, error)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(job.id)
            .bind(entry.timestamp)
            .bind(entry.stage.as_str())
            .bind(&entry.message)
            .bind(&entry.error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        let pool = self.pool.as_ref();
        let Some(row) = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, request, state, scripts, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        else {
            return Ok(None);
        };

        let log = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT logged_at, stage, message, error
            FROM job_log
            WHERE job_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(JobLogEntry::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        let cells = sqlx::query_as::<_, CellRow>(
            r#"
            SELECT variant, language, outcome
            FROM job_cells
            WHERE job_id = $1
            ORDER BY ordinal ASC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Cell::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(Job {
            id: row.id,
            request: row.request.0,
            state: parse_state(&row.state)?,
            log,
            cells,
            scripts: row.scripts.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<JobSummary>> {
        let pool = self.pool.as_ref();
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, request, state, scripts, created_at, updated_at
            FROM jobs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(JobSummary {
                    id: row.id,
                    title: row.request.0.title.clone(),
                    state: parse_state(&row.state)?,
                    variant_count: row.request.0.variant_count,
                    target_languages: row.request.0.target_languages.clone(),
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    async fn transition(&self, id: Uuid, from: JobState, to: JobState) -> AppResult<bool> {
        check_transition(from, to)?;
        let pool = self.pool.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $3, updated_at = NOW()
            WHERE id = $1 AND state = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM jobs WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(AppError::NotFound(format!("job {} not found", id)))
        }
    }

    async fn append_log(&self, id: Uuid, entry: &JobLogEntry) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query(
            r#"
            INSERT INTO job_log (job_id, logged_at, stage, message, error)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(entry.timestamp)
        .bind(entry.stage.as_str())
        .bind(&entry.message)
        .bind(&entry.error)
        .execute(pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_foreign_key_violation() {
                    return AppError::NotFound(format!("job {} not found", id));
                }
            }
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn resolve_cells(&self, id: Uuid, cells: &[CellKey]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // row lock serializes concurrent resolution of the same job
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", id)))?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_cells WHERE job_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Err(AppError::Conflict(format!("cells for job {} already resolved", id)));
        }

        let pending = Json(CellOutcome::Pending);
        for (ordinal, key) in cells.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO job_cells (job_id, variant, language, ordinal, status, outcome)
                VALUES ($1, $2, $3, $4, 'pending', $5)
                "#,
            )
            .bind(id)
            .bind(key.variant as i32)
            .bind(key.language.as_str())
            .bind(ordinal as i32)
            .bind(&pending)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fill_cell(&self, id: Uuid, key: &CellKey, outcome: &CellOutcome) -> AppResult<bool> {
        check_fill(outcome)?;
        let pool = self.pool.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE job_cells
            SET status = $4, outcome = $5, updated_at = NOW()
            WHERE job_id = $1 AND variant = $2 AND language = $3 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(key.variant as i32)
        .bind(key.language.as_str())
        .bind(outcome.status())
        .bind(Json(outcome))
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_scripts(&self, id: Uuid, scripts: &JobScripts) -> AppResult<()> {
        let pool = self.pool.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET scripts = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(scripts))
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("job {} not found", id)));
        }
        Ok(())
    }
}
