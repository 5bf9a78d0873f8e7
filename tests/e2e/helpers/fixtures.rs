use anyhow::Result;
use scriptcast_backend::domain::generation::GenerationRequest;
use scriptcast_backend::domain::job::Job;
use scriptcast_backend::infrastructure::repositories::{JobRepository, PgJobRepository};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// JSON body for `POST /api/jobs`
pub fn generation_request(variant_count: u32, targets: &[&str]) -> Value {
    json!({
        "title": "The lighthouse keeper",
        "variant_count": variant_count,
        "base_language": "en-US",
        "target_languages": targets,
        "block_structure": "",
        "prompts": {
            "premise": "Write a premise for {title}",
            "persona": "You are a calm narrator.",
            "cultural_adaptation": "Adapt idioms and references."
        }
    })
}

pub struct TestFixtures {
    pub repo: PgJobRepository,
}

impl TestFixtures {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: PgJobRepository::new(Arc::new(pool)),
        }
    }

    /// Persist a queued job directly, bypassing the queue
    pub async fn insert_job(&self, variant_count: u32, targets: &[&str]) -> Result<Job> {
        let request: GenerationRequest =
            serde_json::from_value(generation_request(variant_count, targets))?;
        let job = Job::new(request);
        self.repo.insert(&job).await?;
        Ok(job)
    }

    pub async fn job(&self, id: Uuid) -> Result<Job> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {} missing", id))
    }
}
