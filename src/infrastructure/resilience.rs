use crate::domain::generation::ProviderError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_retry2::{strategy::jitter, strategy::ExponentialBackoff, Retry, RetryError};
use tokio_util::sync::CancellationToken;

/// Timeout and retry budget applied to every collaborator call
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Gate every text and speech call goes through.
///
/// A single instance is shared by all jobs so the semaphore caps in-flight
/// calls process-wide. Each attempt holds one permit for the duration of the
/// provider call only; backoff sleeps do not hold a permit.
pub struct CallGuard {
    permits: Arc<Semaphore>,
    policy: CallPolicy,
}

impl CallGuard {
    pub fn new(max_concurrent_calls: usize, policy: CallPolicy) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
            policy,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `operation` under the concurrency cap with timeout and retries.
    ///
    /// Cancellation is checked before each attempt and while waiting for a
    /// permit. A call already dispatched to the provider is left to finish
    /// or hit its timeout.
    pub async fn call<F, Fut, T>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        // delay for attempt n is base_delay * 2^(n-1), capped
        let half_base = (self.policy.base_delay.as_millis() as u64 / 2).max(1);
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(half_base)
            .max_delay(self.policy.max_delay)
            .map(jitter)
            .take(self.policy.max_retries);

        let attempts = AtomicUsize::new(0);

        Retry::spawn(retry_strategy, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

            if cancel.is_cancelled() {
                return Err(RetryError::Permanent(ProviderError::Cancelled));
            }

            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Permanent(ProviderError::Cancelled));
                }
                permit = self.permits.acquire() => permit.map_err(|_| {
                    RetryError::Permanent(ProviderError::Unavailable(
                        "call limiter closed".to_string(),
                    ))
                })?,
            };

            let result = match tokio::time::timeout(self.policy.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.policy.timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(call = label, attempt, "Collaborator call succeeded after retry");
                    }
                    Ok(value)
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(call = label, attempt, error = %e, "Transient error, will retry");
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => {
                    tracing::warn!(call = label, attempt, error = %e, "Permanent error, failing immediately");
                    Err(RetryError::Permanent(e))
                }
            }
        })
        .await
    }
}
