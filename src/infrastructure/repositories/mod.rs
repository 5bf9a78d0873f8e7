pub mod asset_repository;
pub mod job_repository;
pub mod openai_text_generation_repository;
pub mod openai_tts_repository;
pub mod pg_job_repository;
pub mod polly_tts_repository;
pub mod text_generation_repository;
pub mod tts_repository;

pub use asset_repository::{AssetRepository, FileAssetRepository};
pub use job_repository::{InMemoryJobRepository, JobRepository};
pub use openai_text_generation_repository::OpenAiTextGenerationRepository;
pub use openai_tts_repository::OpenAiTtsRepository;
pub use pg_job_repository::PgJobRepository;
pub use polly_tts_repository::PollyTtsRepository;
pub use text_generation_repository::{TextGenerationRepository, TextGenerationRequest};
pub use tts_repository::{SpeechRequest, SynthesizedSpeech, TtsRepository};
