use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{2,3})(?:[-_]([A-Za-z]{4}))?(?:[-_]([A-Za-z]{2}|[0-9]{3}))?$")
        .expect("language tag pattern is valid")
});

/// Languages we can verify adapted output against
const DETECTABLE: &[Language] = &[
    Language::English,
    Language::Spanish,
    Language::French,
    Language::German,
    Language::Italian,
    Language::Portuguese,
    Language::Japanese,
    Language::Korean,
    Language::Chinese,
    Language::Arabic,
];

/// BCP-47 style language tag such as `en`, `pt-BR` or `zh-Hans-CN`.
///
/// Tags are normalized on construction: the primary subtag is lowercased,
/// the script subtag title-cased and the region uppercased, so `PT_br` and
/// `pt-BR` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(tag: &str) -> Result<Self, String> {
        let captures = TAG_PATTERN
            .captures(tag.trim())
            .ok_or_else(|| format!("invalid language tag '{}'", tag))?;

        let mut normalized = captures[1].to_lowercase();
        if let Some(script) = captures.get(2) {
            let script = script.as_str().to_lowercase();
            let mut chars = script.chars();
            if let Some(first) = chars.next() {
                normalized.push('-');
                normalized.extend(first.to_uppercase());
                normalized.push_str(chars.as_str());
            }
        }
        if let Some(region) = captures.get(3) {
            normalized.push('-');
            normalized.push_str(&region.as_str().to_uppercase());
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag (`pt` for `pt-BR`)
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Region subtag, if any (`BR` for `pt-BR`)
    pub fn region(&self) -> Option<&str> {
        self.0
            .split('-')
            .skip(1)
            .find(|part| part.len() == 2 || part.chars().all(|c| c.is_ascii_digit()))
    }

    pub fn to_lingua(&self) -> Option<Language> {
        match self.primary() {
            "en" => Some(Language::English),
            "es" => Some(Language::Spanish),
            "fr" => Some(Language::French),
            "de" => Some(Language::German),
            "it" => Some(Language::Italian),
            "pt" => Some(Language::Portuguese),
            "ja" => Some(Language::Japanese),
            "ko" => Some(Language::Korean),
            "zh" => Some(Language::Chinese),
            "ar" => Some(Language::Arabic),
            _ => None,
        }
    }

    /// Human readable English name, used inside prompts
    pub fn display_name(&self) -> String {
        let base = match self.primary() {
            "en" => "English",
            "es" => "Spanish",
            "fr" => "French",
            "de" => "German",
            "it" => "Italian",
            "pt" => "Portuguese",
            "ja" => "Japanese",
            "ko" => "Korean",
            "zh" => "Chinese",
            "ar" => "Arabic",
            "hi" => "Hindi",
            "ru" => "Russian",
            "nl" => "Dutch",
            "pl" => "Polish",
            "tr" => "Turkish",
            _ => return self.0.clone(),
        };

        match self.region() {
            Some(region) => format!("{} ({})", base, region),
            None => base.to_string(),
        }
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LanguageCode::parse(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for LanguageCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageCode::parse(s)
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of checking a generated text against the language it should be in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageCheck {
    Matches,
    Mismatch { detected: &'static str },
    Undetermined,
}

/// Wraps a lingua detector restricted to the languages compiled in
pub struct LanguageVerifier {
    detector: LanguageDetector,
}

impl Default for LanguageVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageVerifier {
    pub fn new() -> Self {
        Self {
            detector: LanguageDetectorBuilder::from_languages(DETECTABLE).build(),
        }
    }

    pub fn check(&self, text: &str, expected: &LanguageCode) -> LanguageCheck {
        let Some(expected) = expected.to_lingua() else {
            return LanguageCheck::Undetermined;
        };

        match self.detector.detect_language_of(text) {
            Some(detected) if detected == expected => LanguageCheck::Matches,
            Some(detected) => LanguageCheck::Mismatch {
                detected: lingua_name(detected),
            },
            None => LanguageCheck::Undetermined,
        }
    }
}

fn lingua_name(language: Language) -> &'static str {
    match language {
        Language::English => "en",
        Language::Spanish => "es",
        Language::French => "fr",
        Language::German => "de",
        Language::Italian => "it",
        Language::Portuguese => "pt",
        Language::Japanese => "ja",
        Language::Korean => "ko",
        Language::Chinese => "zh",
        Language::Arabic => "ar",
    }
}
