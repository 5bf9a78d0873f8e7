use crate::e2e::helpers;

use helpers::assertions::{assert_snapshot_response, assert_succeeded_cell, cells_with_status};
use helpers::fixtures::generation_request;
use helpers::providers::StubTextGenerator;
use helpers::TestContext;
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use test_context::{test_context, AsyncTestContext};

async fn submit(ctx: &TestContext, body: &serde_json::Value) -> String {
    let response = ctx.client.post("/api/jobs", body).await.unwrap();
    response.assert_status(StatusCode::ACCEPTED);

    let body = response.body.as_ref().unwrap();
    assert_eq!(body.get("state").and_then(|v| v.as_str()), Some("queued"));
    body.get("id")
        .and_then(|v| v.as_str())
        .expect("Missing id field")
        .to_string()
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_run_a_single_variant_job_to_completion(ctx: &TestContext) {
    let job_id = submit(ctx, &generation_request(1, &["fr-FR"])).await;

    let snapshot = ctx.wait_for_terminal(&job_id).await;

    assert_snapshot_response(&snapshot);
    assert_eq!(snapshot["state"], "completed");
    assert_eq!(snapshot["progress"], 100);
    assert_eq!(snapshot["counts"], json!({"total": 1, "pending": 0, "succeeded": 1, "failed": 0}));

    let cell = &snapshot["cells"][0];
    assert_eq!(cell["variant"], 1);
    assert_eq!(cell["language"], "fr-FR");
    assert_succeeded_cell(cell);
    assert_eq!(cell["outcome"]["audio"]["voice"], "stub-fr");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_resolve_variants_times_languages_cells(ctx: &TestContext) {
    let job_id = submit(ctx, &generation_request(3, &["fr-FR", "de-DE"])).await;

    let snapshot = ctx.wait_for_terminal(&job_id).await;

    assert_eq!(snapshot["state"], "completed");
    assert_eq!(snapshot["counts"]["total"], 6);
    assert_eq!(cells_with_status(&snapshot, "succeeded").len(), 6);
    assert_eq!(snapshot["scripts"]["variants"].as_array().unwrap().len(), 3);

    let mut keys: Vec<(u64, String)> = snapshot["cells"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| (c["variant"].as_u64().unwrap(), c["language"].as_str().unwrap().to_string()))
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 6);
}

#[tokio::test]
async fn it_should_complete_with_errors_when_one_language_fails() {
    let ctx = TestContext::start(StubTextGenerator::new().rejecting_adaptation_into("German"))
        .await
        .unwrap();
    let job_id = submit(&ctx, &generation_request(1, &["fr-FR", "de-DE"])).await;

    let snapshot = ctx.wait_for_terminal(&job_id).await;

    assert_eq!(snapshot["state"], "completed_with_errors");
    let succeeded = cells_with_status(&snapshot, "succeeded");
    let failed = cells_with_status(&snapshot, "failed");
    assert_eq!(succeeded.len(), 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(succeeded[0]["language"], "fr-FR");
    assert_eq!(failed[0]["language"], "de-DE");
    assert_eq!(failed[0]["outcome"]["stage"], "adaptation");
    assert!(failed[0]["outcome"]["error"]
        .as_str()
        .unwrap()
        .contains("refused"));

    ctx.teardown().await;
}

#[tokio::test]
async fn it_should_fail_the_job_on_malformed_block_structure() {
    let ctx = TestContext::start(StubTextGenerator::new()).await.unwrap();
    let mut body = generation_request(2, &["fr-FR"]);
    body["block_structure"] = json!("BLOCK 1: Opening\nGOAL: 500 characters\nBLOCK 2: Close\nRULES: Land the ending.");

    let job_id = submit(&ctx, &body).await;
    let snapshot = ctx.wait_for_terminal(&job_id).await;

    assert_eq!(snapshot["state"], "failed");
    assert!(cells_with_status(&snapshot, "succeeded").is_empty());
    let failure = snapshot["log"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["stage"] == "segmentation" && entry["error"].is_string())
        .expect("Missing segmentation failure log entry");
    assert!(failure["error"].as_str().unwrap().contains("rules"));

    ctx.teardown().await;
}

#[tokio::test]
async fn it_should_cancel_a_running_job() {
    let ctx = TestContext::start(StubTextGenerator::new().with_delay(Duration::from_millis(150)))
        .await
        .unwrap();
    let job_id = submit(&ctx, &generation_request(2, &["fr-FR", "de-DE"])).await;

    for _ in 0..50 {
        let response = ctx.client.get(&format!("/api/jobs/{}", job_id)).await.unwrap();
        if response.body.as_ref().unwrap()["state"] == "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = ctx
        .client
        .post_empty(&format!("/api/jobs/{}/cancel", job_id))
        .await
        .unwrap();
    response.assert_status(StatusCode::OK);
    assert_eq!(response.body.as_ref().unwrap()["cancelled"], true);

    let snapshot = ctx.wait_for_terminal(&job_id).await;
    assert_eq!(snapshot["state"], "failed");
    assert_eq!(snapshot["counts"]["pending"], 0);
    assert!(cells_with_status(&snapshot, "succeeded").is_empty());

    ctx.teardown().await;
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_not_cancel_a_finished_job(ctx: &TestContext) {
    let job_id = submit(ctx, &generation_request(1, &["en-US"])).await;
    ctx.wait_for_terminal(&job_id).await;

    let response = ctx
        .client
        .post_empty(&format!("/api/jobs/{}/cancel", job_id))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["cancelled"], false);
    assert_eq!(body["state"], "completed");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_limit_the_log_tail(ctx: &TestContext) {
    let job_id = submit(ctx, &generation_request(1, &["fr-FR"])).await;
    ctx.wait_for_terminal(&job_id).await;

    let response = ctx
        .client
        .get(&format!("/api/jobs/{}?log_tail=2", job_id))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["log"].as_array().unwrap().len(), 2);
    assert!(body["log_total"].as_u64().unwrap() > 2);
    assert_eq!(body["log"][1]["stage"], "finalize");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_invalid_requests(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/api/jobs", &generation_request(1, &[]))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("at least one target language");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_job(ctx: &TestContext) {
    let response = ctx
        .client
        .get(&format!("/api/jobs/{}", uuid::Uuid::new_v4()))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::NOT_FOUND)
        .assert_error_message("Job not found");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_recent_jobs_newest_first(ctx: &TestContext) {
    let first = submit(ctx, &generation_request(1, &["fr-FR"])).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = submit(ctx, &generation_request(1, &["de-DE"])).await;

    let response = ctx.client.get("/api/jobs?limit=10").await.unwrap();

    response.assert_status(StatusCode::OK);
    let jobs = response.body.as_ref().unwrap().as_array().unwrap().clone();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], second.as_str());
    assert_eq!(jobs[1]["id"], first.as_str());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_estimate_without_running_anything(ctx: &TestContext) {
    let mut body = generation_request(2, &["en-US", "fr-FR"]);
    body["target_length_chars"] = json!(450);

    let response = ctx.client.post("/api/jobs/estimate", &body).await.unwrap();

    response.assert_status(StatusCode::OK);
    let estimate = response.body.as_ref().unwrap();
    assert_eq!(estimate["cells"], 4);
    assert_eq!(estimate["blocks"], 1);
    assert_eq!(estimate["adaptation_calls"], 2);
    assert_eq!(estimate["text_generation_calls"], 1 + 1 + 1 + 2);
    // 450 characters at a 200 character ceiling is 3 chunks per cell
    assert_eq!(estimate["synthesis_calls"], 12);

    let recent = ctx.client.get("/api/jobs").await.unwrap();
    assert!(recent.body.as_ref().unwrap().as_array().unwrap().is_empty());
}
