use crate::domain::generation::PipelineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const UNSPECIFIED_LENGTH: &str = "unspecified length";

const MAX_TITLE_CHARS: usize = 60;

static TITLE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    // a dash only separates the title after a block number
    Regex::new(
        r"(?im)^[ \t]*(?:#+[ \t]*)?(?:BLOCK|BLOCO|BLOQUE)\b[ \t]*(?:\d+[ \t]*[:\-–]|:)[ \t]*(.+?)[ \t]*$",
    )
    .expect("title marker pattern is valid")
});

static GOAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:GOAL|LENGTH|META|OBJETIVO)[ \t]*:[ \t]*(.*?)[ \t]*$")
        .expect("goal marker pattern is valid")
});

static RULES_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:RULES|REGRAS|REGLAS)[ \t]*:[ \t]*").expect("rules marker pattern is valid")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph pattern is valid"));

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?…]+(?:[.!?…]+|$)").expect("sentence pattern is valid"));

static TRANSITION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:then|next|after that|afterwards|finally|meanwhile|later|in conclusion|to conclude|first(?:ly)?|second(?:ly)?|third(?:ly)?|lastly|depois|então|por fim|finalmente|luego|después|al final)\b",
    )
    .expect("transition cue pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Explicit,
    Heuristic,
}

/// One narrative block the script generator writes in a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// 1-based position
    pub ordinal: usize,
    pub title: String,
    pub target_length: String,
    pub rules: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterSettings {
    pub max_heuristic_blocks: usize,
    pub min_fragment_chars: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            max_heuristic_blocks: 8,
            min_fragment_chars: 80,
        }
    }
}

/// Turns a block-structure template into an ordered, non-empty block list
#[derive(Debug, Clone, Default)]
pub struct NarrativeSegmenter {
    settings: SegmenterSettings,
}

impl NarrativeSegmenter {
    pub fn new(settings: SegmenterSettings) -> Self {
        Self { settings }
    }

    pub fn segment(
        &self,
        template: &str,
        target_length_chars: Option<u32>,
    ) -> Result<Vec<BlockDescriptor>, PipelineError> {
        let template = template.replace("\r\n", "\n");

        // strict parsing needs the full marker set, titles alone are prose
        let blocks = if TITLE_MARKER.is_match(&template) && RULES_MARKER.is_match(&template) {
            parse_explicit(&template)?
        } else {
            self.infer_blocks(&template, target_length_chars)
        };

        tracing::debug!(
            blocks = blocks.len(),
            provenance = ?blocks.first().map(|b| b.provenance),
            "Template segmented"
        );

        Ok(blocks)
    }

    fn infer_blocks(&self, template: &str, target_length_chars: Option<u32>) -> Vec<BlockDescriptor> {
        let mut fragments: Vec<String> = Vec::new();
        for paragraph in PARAGRAPH_BREAK.split(template) {
            fragments.extend(split_on_transitions(paragraph));
        }

        let mut merged: Vec<String> = Vec::new();
        let mut carry = String::new();
        for fragment in fragments {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            let short = fragment.chars().count() < self.settings.min_fragment_chars;
            match merged.last_mut() {
                Some(previous) if short => {
                    previous.push('\n');
                    previous.push_str(fragment);
                }
                None if short => {
                    // too short to stand alone, lead into the next block
                    if !carry.is_empty() {
                        carry.push('\n');
                    }
                    carry.push_str(fragment);
                }
                _ => {
                    let mut block = std::mem::take(&mut carry);
                    if !block.is_empty() {
                        block.push('\n');
                    }
                    block.push_str(fragment);
                    merged.push(block);
                }
            }
        }
        if !carry.is_empty() {
            merged.push(carry);
        }

        let cap = self.settings.max_heuristic_blocks.max(1);
        if merged.len() > cap {
            let overflow = merged.split_off(cap - 1).join("\n");
            merged.push(overflow);
        }

        if merged.is_empty() {
            return vec![BlockDescriptor {
                ordinal: 1,
                title: "Full narrative".to_string(),
                target_length: length_guidance(target_length_chars, 1),
                rules: "Tell the complete story from the premise in one continuous piece.".to_string(),
                provenance: Provenance::Heuristic,
            }];
        }

        let count = merged.len();
        merged
            .into_iter()
            .enumerate()
            .map(|(index, text)| BlockDescriptor {
                ordinal: index + 1,
                title: derive_title(&text),
                target_length: length_guidance(target_length_chars, count),
                rules: text,
                provenance: Provenance::Heuristic,
            })
            .collect()
    }
}

fn parse_explicit(template: &str) -> Result<Vec<BlockDescriptor>, PipelineError> {
    let titles: Vec<_> = TITLE_MARKER.captures_iter(template).collect();
    let preamble = titles
        .first()
        .and_then(|c| c.get(0))
        .map(|m| template[..m.start()].trim())
        .unwrap_or_default();

    let mut blocks = Vec::with_capacity(titles.len());
    for (index, captures) in titles.iter().enumerate() {
        let (Some(whole), Some(title)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let section_end = titles
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(template.len());
        let section = &template[whole.end()..section_end];
        let ordinal = index + 1;

        let target_length = GOAL_MARKER
            .captures(section)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|goal| !goal.is_empty())
            .unwrap_or_else(|| UNSPECIFIED_LENGTH.to_string());

        let rules_start = RULES_MARKER.find(section).map(|m| m.end()).ok_or_else(|| {
            PipelineError::Segmentation(format!(
                "block {} '{}' has no rules marker",
                ordinal,
                title.as_str()
            ))
        })?;
        let mut rules = GOAL_MARKER
            .replace_all(&section[rules_start..], "")
            .trim()
            .to_string();
        if rules.is_empty() {
            return Err(PipelineError::Segmentation(format!(
                "block {} '{}' has empty rules",
                ordinal,
                title.as_str()
            )));
        }
        if ordinal == 1 && !preamble.is_empty() {
            rules = format!("{}\n{}", preamble, rules);
        }

        blocks.push(BlockDescriptor {
            ordinal,
            title: title.as_str().trim().to_string(),
            target_length,
            rules,
            provenance: Provenance::Explicit,
        });
    }

    Ok(blocks)
}

/// Split a paragraph before every sentence that opens with a transition cue
fn split_on_transitions(paragraph: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    for sentence in SENTENCE.find_iter(paragraph) {
        let text = sentence.as_str();
        if TRANSITION_CUE.is_match(text.trim_start()) && !current.trim().is_empty() {
            fragments.push(std::mem::take(&mut current));
        }
        current.push_str(text);
    }
    if !current.trim().is_empty() {
        fragments.push(current);
    }
    fragments
}

fn derive_title(text: &str) -> String {
    let first_sentence = SENTENCE
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or(text)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(['.', '!', '?', '…']);

    if first_sentence.chars().count() <= MAX_TITLE_CHARS {
        return first_sentence.to_string();
    }

    let truncated: String = first_sentence.chars().take(MAX_TITLE_CHARS).collect();
    match truncated.rfind(char::is_whitespace) {
        Some(cut) if cut > 0 => format!("{}…", truncated[..cut].trim_end()),
        _ => format!("{}…", truncated),
    }
}

fn length_guidance(target_length_chars: Option<u32>, blocks: usize) -> String {
    match target_length_chars {
        Some(total) if total > 0 => {
            format!("about {} characters", total as usize / blocks.max(1))
        }
        _ => UNSPECIFIED_LENGTH.to_string(),
    }
}
