use super::language::LanguageCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on creative variants per job
pub const MAX_VARIANTS: u32 = 10;

/// Upper bound on target languages per job
pub const MAX_TARGET_LANGUAGES: usize = 20;

/// Free-text prompt templates used by the pipeline stages.
///
/// Templates may reference `{title}`; when the placeholder is missing the
/// title is appended as its own line instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub premise: String,
    pub persona: String,
    /// Instructions used for languages without a specific entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_adaptation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cultural_adaptation_by_language: BTreeMap<LanguageCode, String>,
}

impl PromptTemplates {
    pub fn adaptation_for(&self, language: &LanguageCode) -> Option<&str> {
        self.cultural_adaptation_by_language
            .get(language)
            .or(self.cultural_adaptation.as_ref())
            .map(String::as_str)
    }
}

/// Voice parameters forwarded to the speech provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Speaking rate multiplier, 1.0 is the provider default
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// Pitch offset in semitones, 0.0 is the provider default
    #[serde(default)]
    pub pitch: f32,
    /// Optional voice per target language; providers fall back to their own default
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub voices: BTreeMap<LanguageCode, String>,
}

fn default_rate() -> f32 {
    1.0
}

impl SpeechSettings {
    /// Voice requested for a language, if any
    pub fn voice_for(&self, language: &LanguageCode) -> Option<&str> {
        self.voices.get(language).map(String::as_str)
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: 0.0,
            voices: BTreeMap::new(),
        }
    }
}

/// Everything needed to run one job. Immutable once the job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub title: String,
    #[serde(default = "default_variant_count")]
    pub variant_count: u32,
    pub base_language: LanguageCode,
    pub target_languages: Vec<LanguageCode>,
    #[serde(default)]
    pub block_structure: String,
    /// Approximate total script length in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_length_chars: Option<u32>,
    pub prompts: PromptTemplates,
    #[serde(default)]
    pub speech: SpeechSettings,
}

fn default_variant_count() -> u32 {
    1
}

impl GenerationRequest {
    /// Check the request invariants before a job is created from it
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title cannot be empty".to_string());
        }
        if self.variant_count == 0 {
            return Err("variant_count must be at least 1".to_string());
        }
        if self.variant_count > MAX_VARIANTS {
            return Err(format!("variant_count must be at most {}", MAX_VARIANTS));
        }
        if self.target_languages.is_empty() {
            return Err("at least one target language is required".to_string());
        }
        if self.target_languages.len() > MAX_TARGET_LANGUAGES {
            return Err(format!(
                "at most {} target languages are allowed",
                MAX_TARGET_LANGUAGES
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for language in &self.target_languages {
            if !seen.insert(language) {
                return Err(format!("duplicate target language '{}'", language));
            }
        }

        if !(0.25..=4.0).contains(&self.speech.rate) {
            return Err("speech rate must be between 0.25 and 4.0".to_string());
        }
        if !(-20.0..=20.0).contains(&self.speech.pitch) {
            return Err("speech pitch must be between -20 and 20 semitones".to_string());
        }

        Ok(())
    }
}

/// Substitute `{title}` in a template, appending the title when the
/// placeholder is absent.
pub fn render_with_title(template: &str, title: &str) -> String {
    if template.contains("{title}") {
        template.replace("{title}", title)
    } else if template.trim().is_empty() {
        format!("Title: {}", title)
    } else {
        format!("{}\n\nTitle: {}", template.trim_end(), title)
    }
}
