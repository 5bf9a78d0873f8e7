use std::time::Duration;

/// Failure reported by an external collaborator (text or speech provider)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Transient failures are retried with backoff, the rest fail immediately
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Unavailable(_) | ProviderError::Timeout(_)
        )
    }
}

/// Stage-level failure taxonomy of the generation pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("segmentation error: {0}")]
    Segmentation(String),
    #[error("generation error during {stage}: {source}")]
    Generation {
        stage: &'static str,
        #[source]
        source: ProviderError,
    },
    #[error("parse shortfall: variant {variant} not recovered ({recovered} of {expected} variants parsed)")]
    ParseShortfall {
        variant: u32,
        recovered: usize,
        expected: u32,
    },
    #[error("synthesis error on chunk {chunk}: {source}")]
    Synthesis {
        chunk: usize,
        #[source]
        source: ProviderError,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn generation(stage: &'static str, source: ProviderError) -> Self {
        if source == ProviderError::Cancelled {
            return PipelineError::Cancelled;
        }
        PipelineError::Generation { stage, source }
    }

    pub fn synthesis(chunk: usize, source: ProviderError) -> Self {
        if source == ProviderError::Cancelled {
            return PipelineError::Cancelled;
        }
        PipelineError::Synthesis { chunk, source }
    }

    /// Raw collaborator detail preserved for diagnostics
    pub fn detail(&self) -> Option<String> {
        match self {
            PipelineError::Generation { source, .. } | PipelineError::Synthesis { source, .. } => {
                Some(format!("{:?}", source))
            }
            PipelineError::Storage(detail) => Some(detail.clone()),
            _ => None,
        }
    }
}
