use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::generation::GenerationRequest;
use crate::domain::job::{CancelResponse, Estimate, JobAccepted, JobSnapshot, JobSummary};
use crate::{
    domain::job::{JobService, JobServiceApi},
    error::AppResult,
};

const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub log_tail: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

pub struct JobController {
    job_service: Arc<JobService>,
}

impl JobController {
    pub fn new(job_service: Arc<JobService>) -> Self {
        Self { job_service }
    }

    /// POST /api/jobs - Submit a generation request
    pub async fn submit(
        State(controller): State<Arc<JobController>>,
        Json(request): Json<GenerationRequest>,
    ) -> AppResult<(StatusCode, Json<JobAccepted>)> {
        let accepted = controller.job_service.submit(request).await?;
        Ok((StatusCode::ACCEPTED, Json(accepted)))
    }

    /// GET /api/jobs - Most recent jobs
    pub async fn list(
        State(controller): State<Arc<JobController>>,
        Query(query): Query<ListQuery>,
    ) -> AppResult<Json<Vec<JobSummary>>> {
        let jobs = controller
            .job_service
            .list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(Json(jobs))
    }

    /// GET /api/jobs/{id} - Poll a job
    pub async fn poll(
        State(controller): State<Arc<JobController>>,
        Path(job_id): Path<Uuid>,
        Query(query): Query<PollQuery>,
    ) -> AppResult<Json<JobSnapshot>> {
        let snapshot = controller.job_service.poll(job_id, query.log_tail).await?;
        Ok(Json(snapshot))
    }

    /// POST /api/jobs/{id}/cancel
    pub async fn cancel(
        State(controller): State<Arc<JobController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<Json<CancelResponse>> {
        let response = controller.job_service.cancel(job_id).await?;
        Ok(Json(response))
    }

    /// POST /api/jobs/estimate - Call volume for a request, nothing is run
    pub async fn estimate(
        State(controller): State<Arc<JobController>>,
        Json(request): Json<GenerationRequest>,
    ) -> AppResult<Json<Estimate>> {
        let estimate = controller.job_service.estimate(&request).await?;
        Ok(Json(estimate))
    }
}
