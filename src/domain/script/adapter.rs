use crate::domain::generation::{
    LanguageCheck, LanguageCode, LanguageVerifier, PipelineError, PromptTemplates,
};
use crate::infrastructure::repositories::{TextGenerationRepository, TextGenerationRequest};
use crate::infrastructure::resilience::CallGuard;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_INSTRUCTIONS: &str =
    "Translate naturally, replace idioms with local equivalents, localize cultural references and keep the tone.";

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedText {
    pub text: String,
    /// Source script reused unchanged because the target is the source language
    pub identity: bool,
    pub check: LanguageCheck,
}

/// Localizes one script into one target language
pub struct CulturalAdapter {
    text_repo: Arc<dyn TextGenerationRepository>,
    guard: Arc<CallGuard>,
    verifier: Arc<LanguageVerifier>,
    temperature: f32,
    max_tokens: u32,
}

impl CulturalAdapter {
    pub fn new(
        text_repo: Arc<dyn TextGenerationRepository>,
        guard: Arc<CallGuard>,
        verifier: Arc<LanguageVerifier>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            text_repo,
            guard,
            verifier,
            temperature,
            max_tokens,
        }
    }

    pub async fn adapt(
        &self,
        script: &str,
        source: &LanguageCode,
        target: &LanguageCode,
        prompts: &PromptTemplates,
        cancel: &CancellationToken,
    ) -> Result<AdaptedText, PipelineError> {
        if source == target {
            return Ok(AdaptedText {
                text: script.to_string(),
                identity: true,
                check: LanguageCheck::Matches,
            });
        }

        let instructions = prompts.adaptation_for(target).unwrap_or(DEFAULT_INSTRUCTIONS);
        let call = TextGenerationRequest {
            prompt: format!(
                "Adapt the following script from {source} into {target} for a native {target} audience.\n\
                 {instructions}\n\
                 Return only the adapted script, with no notes or explanations.\n\n\
                 SCRIPT:\n\"\"\"\n{script}\n\"\"\"",
                source = source.display_name(),
                target = target.display_name(),
                instructions = instructions.trim(),
                script = script,
            ),
            creativity: self.temperature,
            max_length: self.max_tokens,
        };

        let label = format!("adaptation:{}", target);
        let text = self
            .guard
            .call(&label, cancel, || self.text_repo.generate(&call))
            .await
            .map_err(|e| PipelineError::generation("adaptation", e))?;
        let text = text.trim().to_string();

        let check = self.verifier.check(&text, target);
        if let LanguageCheck::Mismatch { detected } = &check {
            tracing::warn!(
                target_language = %target,
                detected_language = detected,
                "Adapted script does not look like the target language"
            );
        }

        Ok(AdaptedText {
            text,
            identity: false,
            check,
        })
    }
}
