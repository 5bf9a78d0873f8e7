use crate::domain::generation::ProviderError;
use async_trait::async_trait;

/// One stateless call to a text-generation model
#[derive(Debug, Clone, PartialEq)]
pub struct TextGenerationRequest {
    pub prompt: String,
    /// Sampling temperature; higher is more creative
    pub creativity: f32,
    /// Upper bound on generated tokens
    pub max_length: u32,
}

/// Repository for text-generation operations.
/// Abstracts the underlying model provider (OpenAI, Gemini, local models, etc.)
///
/// Implementations must be stateless per call and classify failures so the
/// caller can tell transient errors (rate limits, outages) from permanent ones.
#[async_trait]
pub trait TextGenerationRepository: Send + Sync {
    async fn generate(&self, request: &TextGenerationRequest) -> Result<String, ProviderError>;
}
