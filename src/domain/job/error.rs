use crate::domain::generation::PipelineError;
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("dependency error: {0}")]
    Dependency(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("job not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("job queue unavailable")]
    QueueUnavailable,
}

impl From<AppError> for JobServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => JobServiceError::Invalid(msg),
            AppError::NotFound(_) => JobServiceError::NotFound,
            AppError::Conflict(msg) => JobServiceError::Conflict(msg),
            _ => JobServiceError::Dependency(err.to_string()),
        }
    }
}

impl From<PipelineError> for JobServiceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Segmentation(msg) => JobServiceError::Invalid(msg),
            other => JobServiceError::Dependency(other.to_string()),
        }
    }
}

impl From<JobServiceError> for AppError {
    fn from(err: JobServiceError) -> Self {
        match err {
            JobServiceError::Invalid(msg) => AppError::BadRequest(msg),
            JobServiceError::NotFound => AppError::NotFound("Job not found".to_string()),
            JobServiceError::Conflict(msg) => AppError::Conflict(msg),
            JobServiceError::QueueUnavailable => {
                AppError::ExternalService("Job queue is not accepting work".to_string())
            }
            JobServiceError::Dependency(msg) => AppError::Internal(msg),
        }
    }
}
