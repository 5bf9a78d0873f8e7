use crate::e2e::helpers;

use helpers::TestContext;
use pretty_assertions::assert_eq;
use scriptcast_backend::domain::generation::{LanguageCode, PipelineError};
use scriptcast_backend::domain::job::{
    resolve_cells, CellFailure, CellKey, CellOutcome, CreativeAngle, JobLogEntry, JobScripts,
    JobState, Stage, VariantScript,
};
use scriptcast_backend::error::AppError;
use scriptcast_backend::infrastructure::repositories::JobRepository;
use test_context::test_context;

fn failed(stage: Stage) -> CellOutcome {
    CellOutcome::Failed(CellFailure::new(
        stage,
        &PipelineError::Storage("disk full".to_string()),
    ))
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_persist_a_queued_job(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(2, &["fr-FR", "de-DE"]).await.unwrap();

    let stored = ctx.fixtures.job(job.id).await.unwrap();

    assert_eq!(stored.state, JobState::Queued);
    assert_eq!(stored.request, job.request);
    assert_eq!(stored.log.len(), 1);
    assert_eq!(stored.log[0].stage, Stage::Queue);
    assert!(stored.cells.is_empty());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_only_transition_from_the_expected_state(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(1, &["fr-FR"]).await.unwrap();
    let repo = &ctx.fixtures.repo;

    assert!(repo.transition(job.id, JobState::Queued, JobState::Running).await.unwrap());
    // second claim of the same job loses
    assert!(!repo.transition(job.id, JobState::Queued, JobState::Running).await.unwrap());
    assert!(repo.transition(job.id, JobState::Running, JobState::Completed).await.unwrap());

    let result = repo.transition(job.id, JobState::Completed, JobState::Running).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(ctx.fixtures.job(job.id).await.unwrap().state, JobState::Completed);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_resolve_cells_once_and_fill_each_once(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(2, &["fr-FR", "de-DE"]).await.unwrap();
    let repo = &ctx.fixtures.repo;
    let cells = resolve_cells(&job.request);

    repo.resolve_cells(job.id, &cells).await.unwrap();
    let again = repo.resolve_cells(job.id, &cells).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let key = CellKey::new(2, LanguageCode::parse("de-DE").unwrap());
    assert!(repo.fill_cell(job.id, &key, &failed(Stage::Synthesis)).await.unwrap());
    assert!(!repo.fill_cell(job.id, &key, &failed(Stage::Adaptation)).await.unwrap());

    let stored = ctx.fixtures.job(job.id).await.unwrap();
    let counts = stored.counts();
    assert_eq!((counts.total, counts.pending, counts.failed), (4, 3, 1));
    match &stored.cell(&key).unwrap().outcome {
        CellOutcome::Failed(failure) => assert_eq!(failure.stage, Stage::Synthesis),
        other => panic!("unexpected outcome {:?}", other),
    }
    // cells keep their resolution order
    let keys: Vec<CellKey> = stored.cells.iter().map(|c| c.key.clone()).collect();
    assert_eq!(keys, cells);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_pending_as_a_fill(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(1, &["fr-FR"]).await.unwrap();
    let repo = &ctx.fixtures.repo;
    let cells = resolve_cells(&job.request);
    repo.resolve_cells(job.id, &cells).await.unwrap();

    let result = repo.fill_cell(job.id, &cells[0], &CellOutcome::Pending).await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_append_log_entries_in_order(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(1, &["fr-FR"]).await.unwrap();
    let repo = &ctx.fixtures.repo;

    for stage in [Stage::Premise, Stage::Segmentation, Stage::BaseScript] {
        repo.append_log(job.id, &JobLogEntry::info(stage, format!("{} done", stage)))
            .await
            .unwrap();
    }
    repo.append_log(
        job.id,
        &JobLogEntry::failure(Stage::Finalize, "finalize failed", &PipelineError::Cancelled),
    )
    .await
    .unwrap();

    let stored = ctx.fixtures.job(job.id).await.unwrap();
    let stages: Vec<Stage> = stored.log.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::Queue, Stage::Premise, Stage::Segmentation, Stage::BaseScript, Stage::Finalize]
    );
    assert_eq!(stored.log[4].error.as_deref(), Some("cancelled"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_round_trip_scripts(ctx: &TestContext) {
    let job = ctx.fixtures.insert_job(2, &["fr-FR"]).await.unwrap();
    let scripts = JobScripts {
        premise: Some("A keeper and a storm.".to_string()),
        blocks: Vec::new(),
        base_script: Some("The storm arrived at dusk.".to_string()),
        variants: vec![VariantScript {
            label: 2,
            angle: CreativeAngle::Philosophical,
            text: "What does a light owe the dark?".to_string(),
        }],
    };

    ctx.fixtures.repo.save_scripts(job.id, &scripts).await.unwrap();

    assert_eq!(ctx.fixtures.job(job.id).await.unwrap().scripts, scripts);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_recent_jobs_newest_first_with_limit(ctx: &TestContext) {
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(ctx.fixtures.insert_job(1, &["fr-FR"]).await.unwrap().id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let recent = ctx.fixtures.repo.list_recent(2).await.unwrap();

    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, ids[2]);
    assert_eq!(recent[1].id, ids[1]);
    assert_eq!(recent[0].title, "The lighthouse keeper");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_none_for_unknown_job(ctx: &TestContext) {
    let missing = ctx.fixtures.repo.find_by_id(uuid::Uuid::new_v4()).await.unwrap();

    assert!(missing.is_none());
}
