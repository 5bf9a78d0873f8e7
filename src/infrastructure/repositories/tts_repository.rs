use crate::domain::generation::{LanguageCode, ProviderError};
use async_trait::async_trait;

/// A single synthesis call. `text` never exceeds the provider's `max_chars`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language: LanguageCode,
    /// Explicit voice; `None` selects the provider default for the language
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
}

/// Decodable, concatenable audio for one chunk of text
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSpeech {
    pub audio: Vec<u8>,
    pub duration_secs: f64,
    /// Voice the provider actually used
    pub voice: String,
}

/// Repository for TTS synthesis operations.
/// Abstracts the underlying TTS provider (AWS Polly, OpenAI, ElevenLabs, etc.)
///
/// Implementations are responsible for:
/// - Advertising their hard per-call character ceiling
/// - Provider-specific voice selection when no voice is requested
/// - Classifying failures as transient or permanent
///
/// Splitting long text and merging audio is done by the caller.
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Maximum characters accepted by a single `synthesize` call
    fn max_chars(&self) -> usize;

    /// Voice used for a language when the request does not name one
    fn default_voice(&self, language: &LanguageCode) -> String;

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedSpeech, ProviderError>;
}

/// Approximate narration length; providers do not report duration for MP3 output
pub fn estimate_duration_secs(text: &str, rate: f32) -> f64 {
    const CHARACTERS_PER_SECOND: f64 = 15.0;
    let rate = if rate > 0.0 { rate as f64 } else { 1.0 };
    text.chars().count() as f64 / (CHARACTERS_PER_SECOND * rate)
}
