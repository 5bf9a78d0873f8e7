use super::tts_repository::{estimate_duration_secs, SpeechRequest, SynthesizedSpeech, TtsRepository};
use crate::domain::generation::{LanguageCode, ProviderError};
use async_trait::async_trait;
use aws_sdk_polly::{
    error::{ProvideErrorMetadata, SdkError},
    types::{Engine, OutputFormat, TextType, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly has a limit of 3000 characters per request
const MAX_CHARS: usize = 3000;

/// AWS Polly implementation of TTS repository
pub struct PollyTtsRepository {
    polly_client: Arc<PollyClient>,
}

impl PollyTtsRepository {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Select the appropriate neural Polly voice for a language and region
    fn voice_for_language(language: &LanguageCode) -> &'static str {
        match (language.primary(), language.region()) {
            ("en", Some("GB")) => "Amy",
            ("en", Some("AU")) => "Olivia",
            ("en", _) => "Joanna",
            ("es", Some("MX")) => "Mia",
            ("es", Some("US")) => "Lupe",
            ("es", _) => "Lucia",
            ("fr", Some("CA")) => "Gabrielle",
            ("fr", _) => "Lea",
            ("de", _) => "Vicki",
            ("it", _) => "Bianca",
            ("pt", Some("PT")) => "Ines",
            ("pt", _) => "Camila",
            ("ja", _) => "Kazuha",
            ("ko", _) => "Seoyeon",
            ("zh", _) => "Zhiyu",
            ("ar", _) => "Hala",
            _ => "Joanna",
        }
    }

    /// Wrap text in SSML so the speaking rate can be applied.
    /// Neural voices do not support pitch prosody, so pitch is not emitted.
    fn to_ssml(text: &str, rate: f32) -> String {
        let escaped = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;");
        let percent = (rate * 100.0).round() as i32;
        format!(
            "<speak><prosody rate=\"{}%\">{}</prosody></speak>",
            percent, escaped
        )
    }

    fn classify<E, R>(err: &SdkError<E, R>) -> ProviderError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                ProviderError::Unavailable(format!("{:?}", err))
            }
            SdkError::ServiceError(_) => match err.code() {
                Some("ThrottlingException") | Some("TooManyRequestsException") => {
                    ProviderError::RateLimited(err.message().unwrap_or("throttled").to_string())
                }
                Some("ServiceFailureException") => {
                    ProviderError::Unavailable(err.message().unwrap_or("service failure").to_string())
                }
                code => ProviderError::Rejected(format!(
                    "{}: {}",
                    code.unwrap_or("ServiceError"),
                    err.message().unwrap_or("no message")
                )),
            },
            _ => ProviderError::Unavailable(format!("{:?}", err)),
        }
    }
}

#[async_trait]
impl TtsRepository for PollyTtsRepository {
    fn max_chars(&self) -> usize {
        MAX_CHARS
    }

    fn default_voice(&self, language: &LanguageCode) -> String {
        Self::voice_for_language(language).to_string()
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedSpeech, ProviderError> {
        let start_time = std::time::Instant::now();
        let voice_name = request
            .voice
            .clone()
            .unwrap_or_else(|| self.default_voice(&request.language));
        let voice_id = VoiceId::from(voice_name.as_str());
        let engine = Engine::Neural;

        if request.pitch != 0.0 {
            tracing::debug!(pitch = request.pitch, "Polly neural voices ignore pitch adjustments");
        }

        tracing::info!(
            language = %request.language,
            voice = %voice_name,
            engine = ?engine,
            output_format = "Mp3",
            text_length = request.text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(Self::to_ssml(&request.text, request.rate))
            .text_type(TextType::Ssml)
            .voice_id(voice_id)
            .output_format(OutputFormat::Mp3)
            .engine(engine.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = ?e,
                    error_display = %e,
                    language = %request.language,
                    voice = %voice_name,
                    engine = ?engine,
                    text_length = request.text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                Self::classify(&e)
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            ProviderError::Unavailable(format!("Failed to read audio stream: {}", e))
        })?;

        let audio = audio_stream.into_bytes().to_vec();

        tracing::info!(
            provider = "polly",
            voice = %voice_name,
            latency_ms = start_time.elapsed().as_millis(),
            characters_count = request.text.chars().count(),
            audio_size_bytes = audio.len(),
            "TTS chunk synthesized"
        );

        Ok(SynthesizedSpeech {
            audio,
            duration_secs: estimate_duration_secs(&request.text, request.rate),
            voice: voice_name,
        })
    }
}
