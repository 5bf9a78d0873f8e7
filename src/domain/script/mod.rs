pub mod adapter;
pub mod generator;
pub mod segmenter;
pub mod variation;

pub use adapter::{AdaptedText, CulturalAdapter};
pub use generator::{GeneratorSettings, ScriptGenerator};
pub use segmenter::{BlockDescriptor, NarrativeSegmenter, Provenance, SegmenterSettings};
pub use variation::{parse_variants, ParsedVariants, VariationExpander};
