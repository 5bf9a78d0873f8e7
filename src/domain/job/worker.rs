use super::model::JobState;
use super::orchestrator::Orchestrator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A submitted job waiting for a worker
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub cancel: CancellationToken,
}

/// Cancellation tokens of jobs that are queued or running in this process
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().await.insert(id, token.clone());
        token
    }

    /// Signal the job's token. Returns false when this process does not own the job.
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.tokens.lock().await.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.tokens.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

/// Fixed set of workers draining the job queue. Each job is worked by
/// exactly one worker; jobs on different workers share nothing but the store.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        receiver: mpsc::Receiver<QueuedJob>,
        orchestrator: Arc<Orchestrator>,
        registry: Arc<CancellationRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..count.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let orchestrator = orchestrator.clone();
                let registry = registry.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    run_worker(worker, receiver, orchestrator, registry, shutdown).await;
                })
            })
            .collect();

        tracing::info!(workers = count.max(1), "Job workers started");
        Self { handles }
    }

    /// Wait for every worker to exit (queue closed or shutdown signalled)
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    orchestrator: Arc<Orchestrator>,
    registry: Arc<CancellationRegistry>,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = next else {
            break;
        };

        tracing::info!(worker, job_id = %job.id, "Worker picked up job");
        let start_time = std::time::Instant::now();
        match orchestrator.run(job.id, job.cancel).await {
            Ok(JobState::Failed) => {
                tracing::warn!(
                    worker,
                    job_id = %job.id,
                    latency_ms = start_time.elapsed().as_millis(),
                    "Job finished as failed"
                );
            }
            Ok(state) => {
                tracing::info!(
                    worker,
                    job_id = %job.id,
                    state = %state,
                    latency_ms = start_time.elapsed().as_millis(),
                    "Job finished"
                );
            }
            Err(e) => {
                tracing::error!(worker, job_id = %job.id, error = %e, "Job run aborted");
            }
        }
        registry.remove(job.id).await;
    }

    tracing::debug!(worker, "Job worker stopped");
}
