use crate::domain::generation::request::render_with_title;
use crate::domain::generation::{GenerationRequest, PipelineError};
use crate::domain::job::{Variant, VariantScript};
use crate::infrastructure::repositories::{TextGenerationRepository, TextGenerationRequest};
use crate::infrastructure::resilience::CallGuard;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

static SENTINEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[\s*VARIANT\s*[:#]?\s*(\d+)\s*\]\]").expect("variant sentinel pattern is valid")
});

/// Decoration models like to wrap around a sentinel line
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\A(?:[ \t]*(?:[-=*_#]{3,}|\*\*|#+)[ \t]*\n)+|(?:\n[ \t]*(?:[-=*_#]{3,}|\*\*)[ \t]*)+\z")
        .expect("boilerplate pattern is valid")
});

pub fn sentinel(label: u32) -> String {
    format!("[[VARIANT:{}]]", label)
}

/// Result of splitting one multi-variant response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedVariants {
    pub expected: u32,
    pub recovered: BTreeMap<u32, String>,
}

impl ParsedVariants {
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.expected)
            .filter(|label| !self.recovered.contains_key(label))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.recovered.len() as u32 == self.expected
    }
}

/// Split `raw` on sentinels. Only text that follows a sentinel for a label in
/// `1..=expected` is recovered; the first occurrence of a label wins and any
/// text before the first sentinel is dropped.
pub fn parse_variants(raw: &str, expected: u32) -> ParsedVariants {
    let markers: Vec<(u32, usize, usize)> = SENTINEL
        .captures_iter(raw)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let label = captures.get(1)?.as_str().parse::<u32>().ok()?;
            Some((label, whole.start(), whole.end()))
        })
        .collect();

    let mut recovered = BTreeMap::new();
    for (index, (label, _, body_start)) in markers.iter().enumerate() {
        if *label == 0 || *label > expected || recovered.contains_key(label) {
            continue;
        }
        let body_end = markers
            .get(index + 1)
            .map(|(_, start, _)| *start)
            .unwrap_or(raw.len());
        let body = clean_segment(&raw[*body_start..body_end]);
        if !body.is_empty() {
            recovered.insert(*label, body);
        }
    }

    ParsedVariants {
        expected,
        recovered,
    }
}

fn clean_segment(segment: &str) -> String {
    let trimmed = segment.trim();
    BOILERPLATE.replace_all(trimmed, "").trim().to_string()
}

/// Asks for all N variants in one call and parses them apart
pub struct VariationExpander {
    text_repo: Arc<dyn TextGenerationRepository>,
    guard: Arc<CallGuard>,
    temperature: f32,
    max_tokens: u32,
}

impl VariationExpander {
    pub fn new(
        text_repo: Arc<dyn TextGenerationRepository>,
        guard: Arc<CallGuard>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            text_repo,
            guard,
            temperature,
            max_tokens,
        }
    }

    pub async fn expand(
        &self,
        request: &GenerationRequest,
        premise: &str,
        base_script: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<VariantScript>, ParsedVariants), PipelineError> {
        let variants = Variant::rotation(request.variant_count);
        let call = TextGenerationRequest {
            prompt: self.prompt(request, premise, base_script, &variants),
            creativity: self.temperature,
            max_length: self.max_tokens,
        };

        let raw = self
            .guard
            .call("variation", cancel, || self.text_repo.generate(&call))
            .await
            .map_err(|e| PipelineError::generation("variation", e))?;

        let parsed = parse_variants(&raw, request.variant_count);
        tracing::info!(
            expected = parsed.expected,
            recovered = parsed.recovered.len(),
            response_chars = raw.chars().count(),
            "Variation response parsed"
        );

        let scripts = variants
            .iter()
            .filter_map(|variant| {
                parsed.recovered.get(&variant.label).map(|text| VariantScript {
                    label: variant.label,
                    angle: variant.angle,
                    text: text.clone(),
                })
            })
            .collect();

        Ok((scripts, parsed))
    }

    fn prompt(
        &self,
        request: &GenerationRequest,
        premise: &str,
        base_script: &str,
        variants: &[Variant],
    ) -> String {
        let angles = variants
            .iter()
            .map(|v| format!("- Variant {}: {}", v.label, v.angle.guidance()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{persona}\n\n{title_line}\n\nPREMISE:\n{premise}\n\nREFERENCE SCRIPT:\n\"\"\"\n{base}\n\"\"\"\n\n\
             Write {count} distinct complete scripts in {language}, each retelling the reference \
             script from its own creative angle:\n{angles}\n\n\
             Start each script on its own line with its marker, exactly {first} for variant 1, \
             {second} for variant 2 and so on. Write nothing before the first marker and no \
             commentary between scripts.",
            persona = request.prompts.persona.trim(),
            title_line = render_with_title("", &request.title),
            premise = premise,
            base = base_script,
            count = request.variant_count,
            language = request.base_language.display_name(),
            angles = angles,
            first = sentinel(1),
            second = sentinel(2),
        )
    }
}
