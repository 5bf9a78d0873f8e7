use super::openai_text_generation_repository::classify_openai_error;
use super::tts_repository::{estimate_duration_secs, SpeechRequest, SynthesizedSpeech, TtsRepository};
use crate::domain::generation::{LanguageCode, ProviderError};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI has a limit of 4096 characters per request
const MAX_CHARS: usize = 4096;

/// OpenAI TTS implementation of TTS repository
pub struct OpenAiTtsRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    default_voice: String,
}

impl OpenAiTtsRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String, default_voice: String) -> Self {
        Self {
            client,
            model,
            default_voice,
        }
    }

    /// Select the appropriate OpenAI voice for a language
    /// Based on voice characteristics that suit each language
    fn voice_for_language(language: &LanguageCode) -> &'static str {
        match language.primary() {
            "es" => "echo",
            "fr" => "nova",
            "de" => "onyx",
            "it" => "fable",
            "pt" => "shimmer",
            _ => "alloy",
        }
    }

    fn parse_voice(voice: &str) -> Voice {
        match voice.to_lowercase().as_str() {
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "nova" => Voice::Nova,
            "shimmer" => Voice::Shimmer,
            _ => Voice::Alloy,
        }
    }
}

#[async_trait]
impl TtsRepository for OpenAiTtsRepository {
    fn max_chars(&self) -> usize {
        MAX_CHARS
    }

    fn default_voice(&self, language: &LanguageCode) -> String {
        if self.default_voice.is_empty() {
            Self::voice_for_language(language).to_string()
        } else {
            self.default_voice.clone()
        }
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedSpeech, ProviderError> {
        let start_time = std::time::Instant::now();
        let voice = request
            .voice
            .clone()
            .unwrap_or_else(|| self.default_voice(&request.language));

        if request.pitch != 0.0 {
            tracing::debug!(pitch = request.pitch, "OpenAI TTS ignores pitch adjustments");
        }

        tracing::info!(
            model = %self.model,
            voice = %voice,
            language = %request.language,
            text_length = request.text.len(),
            "Calling OpenAI TTS API"
        );

        let model = match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        };

        let speech_request = CreateSpeechRequest {
            model,
            input: request.text.clone(),
            voice: Self::parse_voice(&voice),
            response_format: None, // Defaults to MP3
            speed: Some(request.rate.clamp(0.25, 4.0)),
        };

        let response = self
            .client
            .audio()
            .speech(speech_request)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    model = %self.model,
                    voice = %voice,
                    text_length = request.text.len(),
                    "OpenAI TTS API call failed"
                );
                classify_openai_error(e)
            })?;

        let audio = response.bytes.to_vec();

        tracing::info!(
            provider = "openai",
            model = %self.model,
            voice = %voice,
            latency_ms = start_time.elapsed().as_millis(),
            characters_count = request.text.chars().count(),
            audio_size_bytes = audio.len(),
            "TTS chunk synthesized"
        );

        Ok(SynthesizedSpeech {
            audio,
            duration_secs: estimate_duration_secs(&request.text, request.rate),
            voice,
        })
    }
}
