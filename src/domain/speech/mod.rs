pub mod assembler;
pub mod chunker;

pub use assembler::{estimated_chunk_count, SpeechAssembler};
pub use chunker::split_into_chunks;
