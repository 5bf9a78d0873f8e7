use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use scriptcast_backend::controllers::jobs::JobController;
use scriptcast_backend::domain::generation::LanguageVerifier;
use scriptcast_backend::domain::job::{CancellationRegistry, JobService, Orchestrator, WorkerPool};
use scriptcast_backend::infrastructure::config::{Config, LogFormat, SpeechProvider};
use scriptcast_backend::infrastructure::db::{check_connection, create_pool, run_migrations, DbPool};
use scriptcast_backend::infrastructure::http::start_http_server;
use scriptcast_backend::infrastructure::repositories::{
    FileAssetRepository, InMemoryJobRepository, JobRepository, OpenAiTextGenerationRepository,
    OpenAiTtsRepository, PgJobRepository, PollyTtsRepository, TtsRepository,
};
use scriptcast_backend::infrastructure::resilience::CallGuard;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting ScriptCast Backend on {}:{}",
        config.host,
        config.port
    );
    if config.is_development() {
        tracing::debug!(?config, "Loaded configuration");
    }

    // Job store: Postgres when configured, otherwise process memory
    let (pool, job_repo): (Option<Arc<DbPool>>, Arc<dyn JobRepository>) = match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            tracing::info!("Database connection pool created");

            check_connection(&pool).await?;
            tracing::info!("Database connection verified");

            run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");

            let pool = Arc::new(pool);
            let job_repo: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(pool.clone()));
            (Some(pool), job_repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory and lost on restart");
            let job_repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
            (None, job_repo)
        }
    };

    let config = Arc::new(config);
    let openai_client = Arc::new(async_openai::Client::new());

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Instantiate provider repositories
    tracing::info!("Instantiating repositories...");
    let text_repo = Arc::new(OpenAiTextGenerationRepository::new(
        openai_client.clone(),
        config.openai_text_model.clone(),
    ));
    let tts_repo: Arc<dyn TtsRepository> = match config.speech_provider {
        SpeechProvider::Polly => {
            tracing::info!("Initializing AWS Polly client with region: {}", config.aws_region);
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.aws_region.clone()))
                .load()
                .await;
            tracing::info!(region = ?aws_config.region(), "AWS configuration loaded");
            Arc::new(PollyTtsRepository::new(Arc::new(aws_sdk_polly::Client::new(
                &aws_config,
            ))))
        }
        SpeechProvider::OpenAi => {
            tracing::info!(model = %config.openai_tts_model, "Using OpenAI speech synthesis");
            Arc::new(OpenAiTtsRepository::new(
                openai_client.clone(),
                config.openai_tts_model.clone(),
                config.openai_tts_voice.clone(),
            ))
        }
    };
    let asset_repo = Arc::new(FileAssetRepository::new(config.asset_dir.clone()));

    // 2. Instantiate the pipeline (shared call guard caps in-flight provider calls)
    tracing::info!("Instantiating pipeline...");
    let guard = Arc::new(CallGuard::new(config.max_concurrent_calls, config.call_policy()));
    let orchestrator = Arc::new(Orchestrator::new(
        job_repo.clone(),
        text_repo,
        tts_repo,
        asset_repo,
        guard,
        Arc::new(LanguageVerifier::new()),
        config.pipeline_settings(),
    ));

    // 3. Instantiate the job service and its workers
    tracing::info!("Instantiating services...");
    let shutdown = CancellationToken::new();
    let registry = Arc::new(CancellationRegistry::new());
    let (queue_tx, queue_rx) = mpsc::channel(config.job_queue_capacity);
    let workers = WorkerPool::spawn(
        config.worker_count,
        queue_rx,
        orchestrator.clone(),
        registry.clone(),
        shutdown.clone(),
    );
    let job_service = Arc::new(JobService::new(
        job_repo,
        orchestrator,
        queue_tx,
        registry,
        config.log_tail_default,
    ));

    // 4. Instantiate controllers (inject services)
    tracing::info!("Instantiating controllers...");
    let job_controller = Arc::new(JobController::new(job_service));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    // Start HTTP server with all routes
    start_http_server(config, pool, job_controller, shutdown.clone()).await?;

    shutdown.cancel();
    workers.join().await;
    tracing::info!("Workers stopped, bye");

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "scriptcast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "scriptcast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
