pub mod request_id;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::controllers::{health, jobs::JobController};
use crate::infrastructure::config::Config;
use crate::infrastructure::db::DbPool;

pub use request_id::{request_id_middleware, RequestId};

/// Build the application router with every route and layer
pub fn build_router(pool: Option<Arc<DbPool>>, job_controller: Arc<JobController>) -> Router {
    let job_routes = Router::new()
        .route("/api/jobs", get(JobController::list).post(JobController::submit))
        .route("/api/jobs/estimate", post(JobController::estimate))
        .route("/api/jobs/:id", get(JobController::poll))
        .route("/api/jobs/:id/cancel", post(JobController::cancel))
        .with_state(job_controller);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(pool)
        .merge(job_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and serve until `shutdown` fires
pub async fn start_http_server(
    config: Arc<Config>,
    pool: Option<Arc<DbPool>>,
    job_controller: Arc<JobController>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(pool, job_controller);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
