use anyhow::Result;
use once_cell::sync::Lazy;
use scriptcast_backend::controllers::jobs::JobController;
use scriptcast_backend::domain::generation::LanguageVerifier;
use scriptcast_backend::domain::job::{
    CancellationRegistry, JobService, Orchestrator, PipelineSettings, WorkerPool,
};
use scriptcast_backend::infrastructure::http::build_router;
use scriptcast_backend::infrastructure::repositories::{FileAssetRepository, PgJobRepository};
use scriptcast_backend::infrastructure::resilience::{CallGuard, CallPolicy};
use serde_json::Value;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use test_context::AsyncTestContext;
use testcontainers::{clients::Cli, Container};
use testcontainers_modules::postgres::Postgres;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod api_client;
pub mod assertions;
pub mod db_pool;
pub mod fixtures;
pub mod providers;

use api_client::TestClient;
use db_pool::{DatabasePool, PooledDatabase};
use fixtures::TestFixtures;
use providers::{StubTextGenerator, StubTts};

// Docker client for test containers
static DOCKER: Lazy<Cli> = Lazy::new(Cli::default);

// Shared PostgreSQL container for all tests
static SHARED_CONTAINER: Lazy<SharedContainer> = Lazy::new(SharedContainer::new);

// Global database pool
static DB_POOL: Lazy<DatabasePool> = Lazy::new(|| DatabasePool::new(SHARED_CONTAINER.port));

/// Shared container that lives for the duration of all tests
struct SharedContainer {
    _container: Container<'static, Postgres>,
    port: u16,
}

impl SharedContainer {
    fn new() -> Self {
        let container = DOCKER.run(Postgres::default());
        let port = container.get_host_port_ipv4(5432);

        println!("🐳 Started shared PostgreSQL container on port {}", port);

        Self {
            _container: container,
            port,
        }
    }
}

pub struct TestContext {
    pub client: TestClient,
    #[allow(dead_code)]
    pub pool: PgPool,
    pub fixtures: TestFixtures,
    asset_dir: PathBuf,
    shutdown: CancellationToken,
    _db: PooledDatabase,
}

impl TestContext {
    /// Start the full app against a fresh database with the given text model
    pub async fn start(text: StubTextGenerator) -> Result<Self> {
        let pooled_db = DB_POOL.get_database().await?;
        let pool = Arc::new(pooled_db.pool.clone());
        let asset_dir = std::env::temp_dir().join(format!("scriptcast-e2e-{}", Uuid::new_v4()));
        let shutdown = CancellationToken::new();

        let job_repo = Arc::new(PgJobRepository::new(pool.clone()));
        let guard = Arc::new(CallGuard::new(
            4,
            CallPolicy {
                timeout: Duration::from_secs(5),
                max_retries: 1,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            job_repo.clone(),
            Arc::new(text),
            Arc::new(StubTts),
            Arc::new(FileAssetRepository::new(asset_dir.clone())),
            guard,
            Arc::new(LanguageVerifier::new()),
            PipelineSettings::default(),
        ));

        let registry = Arc::new(CancellationRegistry::new());
        let (queue_tx, queue_rx) = mpsc::channel(16);
        WorkerPool::spawn(2, queue_rx, orchestrator.clone(), registry.clone(), shutdown.clone());
        let job_service = Arc::new(JobService::new(job_repo, orchestrator, queue_tx, registry, 50));
        let app = build_router(Some(pool), Arc::new(JobController::new(job_service)));

        // Start server
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .unwrap();
        });

        // Wait for server to be ready
        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(Self {
            client: TestClient::new(&base_url),
            pool: pooled_db.pool.clone(),
            fixtures: TestFixtures::new(pooled_db.pool.clone()),
            asset_dir,
            shutdown,
            _db: pooled_db,
        })
    }

    /// Poll a job until it reaches a terminal state and return the final snapshot
    pub async fn wait_for_terminal(&self, job_id: &str) -> Value {
        for _ in 0..300 {
            let response = self
                .client
                .get(&format!("/api/jobs/{}", job_id))
                .await
                .unwrap();
            let body = response.body.clone().expect("Missing job snapshot");
            let state = body.get("state").and_then(|s| s.as_str()).unwrap_or_default();
            if matches!(state, "completed" | "completed_with_errors" | "failed") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not reach a terminal state", job_id);
    }
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            TestContext::start(StubTextGenerator::new())
                .await
                .expect("Failed to start test app")
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.shutdown.cancel();
            let _ = tokio::fs::remove_dir_all(&self.asset_dir).await;
            // Database cleanup happens automatically via Drop on PooledDatabase
        }
    }
}
