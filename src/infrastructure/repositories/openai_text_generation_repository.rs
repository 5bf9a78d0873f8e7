use super::text_generation_repository::{TextGenerationRepository, TextGenerationRequest};
use crate::domain::generation::ProviderError;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI chat-completions implementation of the text-generation repository
pub struct OpenAiTextGenerationRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiTextGenerationRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

/// Map an OpenAI client error onto the provider taxonomy
pub(crate) fn classify_openai_error(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::ApiError(api) => {
            let message = api.message.to_lowercase();
            if message.contains("rate limit") || message.contains("too many requests") {
                ProviderError::RateLimited(api.message)
            } else if message.contains("overloaded") || message.contains("server error") {
                ProviderError::Unavailable(api.message)
            } else {
                ProviderError::Rejected(api.message)
            }
        }
        OpenAIError::Reqwest(e) => ProviderError::Unavailable(e.to_string()),
        OpenAIError::InvalidArgument(msg) => ProviderError::Rejected(msg),
        other => ProviderError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl TextGenerationRepository for OpenAiTextGenerationRepository {
    async fn generate(&self, request: &TextGenerationRequest) -> Result<String, ProviderError> {
        let start_time = std::time::Instant::now();

        tracing::debug!(
            model = %self.model,
            prompt_length = request.prompt.len(),
            creativity = request.creativity,
            max_length = request.max_length,
            "Calling OpenAI chat completion"
        );

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .temperature(request.creativity)
            .max_tokens(request.max_length)
            .messages(vec![message.into()])
            .build()
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            tracing::error!(
                error = %e,
                model = %self.model,
                prompt_length = request.prompt.len(),
                "OpenAI chat completion failed"
            );
            classify_openai_error(e)
        })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Rejected("model returned no content".to_string()))?;

        tracing::info!(
            provider = "openai",
            model = %self.model,
            latency_ms = start_time.elapsed().as_millis(),
            prompt_length = request.prompt.len(),
            output_length = text.len(),
            "Text generation completed"
        );

        Ok(text)
    }
}
