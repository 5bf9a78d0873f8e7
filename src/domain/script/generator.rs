use super::segmenter::BlockDescriptor;
use crate::domain::generation::request::render_with_title;
use crate::domain::generation::{GenerationRequest, PipelineError};
use crate::infrastructure::repositories::{TextGenerationRepository, TextGenerationRequest};
use crate::infrastructure::resilience::CallGuard;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    /// Characters of previous output carried into each block prompt
    pub context_tail_chars: usize,
    pub temperature: f32,
    pub premise_max_tokens: u32,
    pub block_max_tokens: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            context_tail_chars: 1500,
            temperature: 0.7,
            premise_max_tokens: 1024,
            block_max_tokens: 4096,
        }
    }
}

/// Produces the premise and the base script, one block per call, each
/// prompt carrying a bounded tail of what has been written so far
pub struct ScriptGenerator {
    text_repo: Arc<dyn TextGenerationRepository>,
    guard: Arc<CallGuard>,
    settings: GeneratorSettings,
}

impl ScriptGenerator {
    pub fn new(
        text_repo: Arc<dyn TextGenerationRepository>,
        guard: Arc<CallGuard>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            text_repo,
            guard,
            settings,
        }
    }

    pub async fn premise(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "{}\n\nWrite the premise in {}.",
            render_with_title(&request.prompts.premise, &request.title),
            request.base_language.display_name()
        );
        let call = TextGenerationRequest {
            prompt,
            creativity: self.settings.temperature,
            max_length: self.settings.premise_max_tokens,
        };

        let premise = self
            .guard
            .call("premise", cancel, || self.text_repo.generate(&call))
            .await
            .map_err(|e| PipelineError::generation("premise", e))?;

        Ok(premise.trim().to_string())
    }

    /// Generate every block in order. Nothing is returned unless all blocks succeed.
    pub async fn base_script(
        &self,
        request: &GenerationRequest,
        premise: &str,
        blocks: &[BlockDescriptor],
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut script = String::new();

        for block in blocks {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let start_time = std::time::Instant::now();
            let call = TextGenerationRequest {
                prompt: self.block_prompt(request, premise, block, blocks.len(), &script),
                creativity: self.settings.temperature,
                max_length: self.settings.block_max_tokens,
            };

            let text = self
                .guard
                .call("base_script_block", cancel, || self.text_repo.generate(&call))
                .await
                .map_err(|e| {
                    tracing::warn!(
                        block = block.ordinal,
                        blocks = blocks.len(),
                        error = %e,
                        "Block generation failed, discarding partial script"
                    );
                    PipelineError::generation("base_script", e)
                })?;

            if !script.is_empty() {
                script.push_str("\n\n");
            }
            script.push_str(text.trim());

            tracing::debug!(
                block = block.ordinal,
                blocks = blocks.len(),
                block_chars = text.chars().count(),
                script_chars = script.chars().count(),
                latency_ms = start_time.elapsed().as_millis(),
                "Block generated"
            );
        }

        Ok(script)
    }

    fn block_prompt(
        &self,
        request: &GenerationRequest,
        premise: &str,
        block: &BlockDescriptor,
        total_blocks: usize,
        written: &str,
    ) -> String {
        let mut prompt = format!(
            "{persona}\n\nPREMISE:\n{premise}\n\nTITLE: {title}\nLANGUAGE: {language}\n\n\
             Write block {ordinal} of {total}: \"{block_title}\"\n\
             Target length: {length}\n\
             Rules:\n{rules}\n",
            persona = request.prompts.persona.trim(),
            premise = premise,
            title = request.title,
            language = request.base_language.display_name(),
            ordinal = block.ordinal,
            total = total_blocks,
            block_title = block.title,
            length = block.target_length,
            rules = block.rules,
        );

        let tail = context_tail(written, self.settings.context_tail_chars);
        if tail.is_empty() {
            prompt.push_str("\nThis is the opening block. Output only the narration text.");
        } else {
            prompt.push_str(&format!(
                "\nThe script so far ends with:\n\"\"\"\n{}\n\"\"\"\n\
                 Continue seamlessly from there without repeating it. Output only the narration text.",
                tail
            ));
        }
        prompt
    }
}

/// Last `max_chars` characters of `text`, never splitting a character
pub fn context_tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}
