use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::job::PipelineSettings;
use crate::domain::script::{GeneratorSettings, SegmenterSettings};
use crate::infrastructure::resilience::CallPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres job store; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    pub aws_region: String,
    // Providers
    pub speech_provider: SpeechProvider,
    pub openai_text_model: String,
    pub openai_tts_model: String,
    pub openai_tts_voice: String,
    pub asset_dir: String,
    // Workers and collaborator calls
    pub worker_count: usize,
    pub job_queue_capacity: usize,
    pub max_concurrent_calls: usize,
    pub call_timeout_secs: u64,
    pub call_max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    // Pipeline
    pub context_tail_chars: usize,
    pub max_heuristic_blocks: usize,
    pub min_fragment_chars: usize,
    pub default_temperature: f32,
    pub variation_temperature: f32,
    pub synthesis_cache_enabled: bool,
    pub log_tail_default: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    Polly,
    OpenAi,
}

impl FromStr for SpeechProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polly" => Ok(SpeechProvider::Polly),
            "openai" => Ok(SpeechProvider::OpenAi),
            other => anyhow::bail!("unknown speech provider '{}' (expected polly or openai)", other),
        }
    }
}

/// Read `key`, falling back to `default` when unset
fn var_or<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid value '{}' for {}", raw, key))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: var_or("PORT", "8080")?,
            environment: match env::var("ENVIRONMENT").unwrap_or_default().as_str() {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match env::var("LOG_FORMAT").unwrap_or_default().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            speech_provider: var_or("SPEECH_PROVIDER", "polly")?,
            openai_text_model: env::var("OPENAI_TEXT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_tts_model: env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            openai_tts_voice: env::var("OPENAI_TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            asset_dir: env::var("ASSET_DIR").unwrap_or_else(|_| "./assets".to_string()),
            worker_count: var_or("WORKER_COUNT", "2")?,
            job_queue_capacity: var_or("JOB_QUEUE_CAPACITY", "100")?,
            max_concurrent_calls: var_or("MAX_CONCURRENT_CALLS", "8")?,
            call_timeout_secs: var_or("CALL_TIMEOUT_SECS", "120")?,
            call_max_retries: var_or("CALL_MAX_RETRIES", "3")?,
            retry_base_delay_ms: var_or("RETRY_BASE_DELAY_MS", "1000")?,
            retry_max_delay_ms: var_or("RETRY_MAX_DELAY_MS", "30000")?,
            context_tail_chars: var_or("CONTEXT_TAIL_CHARS", "1500")?,
            max_heuristic_blocks: var_or("MAX_HEURISTIC_BLOCKS", "8")?,
            min_fragment_chars: var_or("MIN_FRAGMENT_CHARS", "80")?,
            default_temperature: var_or("DEFAULT_TEMPERATURE", "0.7")?,
            variation_temperature: var_or("VARIATION_TEMPERATURE", "1.0")?,
            synthesis_cache_enabled: parse_flag(
                &env::var("SYNTHESIS_CACHE_ENABLED").unwrap_or_default(),
            ),
            log_tail_default: var_or("LOG_TAIL_DEFAULT", "50")?,
        };

        if config.max_concurrent_calls == 0 {
            anyhow::bail!("MAX_CONCURRENT_CALLS must be at least 1");
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.call_timeout_secs),
            max_retries: self.call_max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        PipelineSettings {
            segmenter: SegmenterSettings {
                max_heuristic_blocks: self.max_heuristic_blocks,
                min_fragment_chars: self.min_fragment_chars,
            },
            generator: GeneratorSettings {
                context_tail_chars: self.context_tail_chars,
                temperature: self.default_temperature,
                ..defaults.generator
            },
            variation_temperature: self.variation_temperature,
            synthesis_cache_enabled: self.synthesis_cache_enabled,
            ..defaults
        }
    }
}
