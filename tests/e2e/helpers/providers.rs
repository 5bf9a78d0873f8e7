use async_trait::async_trait;
use parking_lot::Mutex;
use scriptcast_backend::domain::generation::{LanguageCode, ProviderError};
use scriptcast_backend::infrastructure::repositories::{
    SpeechRequest, SynthesizedSpeech, TextGenerationRepository, TextGenerationRequest,
    TtsRepository,
};
use std::time::Duration;

/// Text model stand-in that answers each pipeline stage by recognizing its prompt
pub struct StubTextGenerator {
    delay: Duration,
    /// Adaptations into this language (display name, e.g. "German") are rejected
    reject_adaptation_into: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StubTextGenerator {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            reject_adaptation_into: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rejecting_adaptation_into(mut self, language: &str) -> Self {
        self.reject_adaptation_into = Some(language.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextGenerationRepository for StubTextGenerator {
    async fn generate(&self, request: &TextGenerationRequest) -> Result<String, ProviderError> {
        self.prompts.lock().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let prompt = request.prompt.as_str();
        if prompt.contains("Write block") {
            return Ok("The keeper climbed the stairs as the storm rolled in.".to_string());
        }
        if prompt.contains("[[VARIANT:1]]") {
            let count = prompt
                .split("Write ")
                .nth(1)
                .and_then(|rest| rest.split(' ').next())
                .and_then(|n| n.parse::<u32>().ok())
                .unwrap_or(1);
            return Ok((1..=count)
                .map(|i| format!("[[VARIANT:{}]]\nRetelling number {} of the stormy night.", i, i))
                .collect::<Vec<_>>()
                .join("\n\n"));
        }
        if prompt.starts_with("Adapt") {
            if let Some(language) = &self.reject_adaptation_into {
                if prompt.contains(&format!("into {}", language)) {
                    return Err(ProviderError::Rejected(format!(
                        "adaptation into {} refused",
                        language
                    )));
                }
            }
            return Ok("Le gardien monta les escaliers pendant que la tempête arrivait.".to_string());
        }
        Ok("A lighthouse keeper faces the longest storm of the decade.".to_string())
    }
}

/// Speech stand-in whose audio is the UTF-8 text
pub struct StubTts;

#[async_trait]
impl TtsRepository for StubTts {
    fn max_chars(&self) -> usize {
        200
    }

    fn default_voice(&self, language: &LanguageCode) -> String {
        format!("stub-{}", language.primary())
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedSpeech, ProviderError> {
        Ok(SynthesizedSpeech {
            audio: request.text.as_bytes().to_vec(),
            duration_secs: request.text.chars().count() as f64 / 15.0,
            voice: request
                .voice
                .clone()
                .unwrap_or_else(|| self.default_voice(&request.language)),
        })
    }
}
