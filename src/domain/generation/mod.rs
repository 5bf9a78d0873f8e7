pub mod error;
pub mod language;
pub mod request;

pub use error::{PipelineError, ProviderError};
pub use language::{LanguageCheck, LanguageCode, LanguageVerifier};
pub use request::{GenerationRequest, PromptTemplates, SpeechSettings};
