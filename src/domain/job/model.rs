use crate::domain::generation::{GenerationRequest, LanguageCode, PipelineError};
use crate::domain::script::BlockDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a job. The last three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::CompletedWithErrors => "completed_with_errors",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "completed_with_errors" => Some(JobState::CompletedWithErrors),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::CompletedWithErrors | JobState::Failed
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            JobState::Queued => matches!(next, JobState::Running | JobState::Failed),
            JobState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage a log entry or failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queue,
    Premise,
    Segmentation,
    BaseScript,
    Variation,
    Adaptation,
    Synthesis,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queue => "queue",
            Stage::Premise => "premise",
            Stage::Segmentation => "segmentation",
            Stage::BaseScript => "base_script",
            Stage::Variation => "variation",
            Stage::Adaptation => "adaptation",
            Stage::Synthesis => "synthesis",
            Stage::Finalize => "finalize",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queue" => Some(Stage::Queue),
            "premise" => Some(Stage::Premise),
            "segmentation" => Some(Stage::Segmentation),
            "base_script" => Some(Stage::BaseScript),
            "variation" => Some(Stage::Variation),
            "adaptation" => Some(Stage::Adaptation),
            "synthesis" => Some(Stage::Synthesis),
            "finalize" => Some(Stage::Finalize),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only, human readable progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobLogEntry {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(stage: Stage, message: impl Into<String>, error: &PipelineError) -> Self {
        let detail = match error.detail() {
            Some(detail) => format!("{} [{}]", error, detail),
            None => error.to_string(),
        };
        Self {
            timestamp: Utc::now(),
            stage,
            message: message.into(),
            error: Some(detail),
        }
    }
}

/// One (variant, language) unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub variant: u32,
    pub language: LanguageCode,
}

impl CellKey {
    pub fn new(variant: u32, language: LanguageCode) -> Self {
        Self { variant, language }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}/{}", self.variant, self.language)
    }
}

/// Location of one synthesized chunk inside the assembled asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentHandle {
    pub index: usize,
    pub byte_offset: u64,
    pub byte_len: u64,
    pub char_count: usize,
    pub duration_secs: f64,
}

/// Assembled narration for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub location: String,
    pub voice: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub segments: Vec<SegmentHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellOutput {
    pub adapted_script: String,
    pub audio: AudioAsset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFailure {
    pub stage: Stage,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Localized text, kept when the cell got past adaptation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapted_script: Option<String>,
}

impl CellFailure {
    pub fn new(stage: Stage, error: &PipelineError) -> Self {
        Self {
            stage,
            error: error.to_string(),
            detail: error.detail(),
            adapted_script: None,
        }
    }

    pub fn with_adapted_script(mut self, script: String) -> Self {
        self.adapted_script = Some(script);
        self
    }
}

/// A cell moves from `Pending` to exactly one of the other two, once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Pending,
    Succeeded(CellOutput),
    Failed(CellFailure),
}

impl CellOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CellOutcome::Pending => "pending",
            CellOutcome::Succeeded(_) => "succeeded",
            CellOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CellOutcome::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(flatten)]
    pub key: CellKey,
    pub outcome: CellOutcome,
}

/// Creative angles assigned to variants in rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeAngle {
    Emotional,
    Philosophical,
    Practical,
    Historical,
    Analytical,
}

pub const ANGLE_ROTATION: [CreativeAngle; 5] = [
    CreativeAngle::Emotional,
    CreativeAngle::Philosophical,
    CreativeAngle::Practical,
    CreativeAngle::Historical,
    CreativeAngle::Analytical,
];

impl CreativeAngle {
    /// Angle for a 1-based variant label, cycling through the rotation
    pub fn for_variant(label: u32) -> Self {
        let index = (label.saturating_sub(1) as usize) % ANGLE_ROTATION.len();
        ANGLE_ROTATION[index]
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            CreativeAngle::Emotional => "emotional: lead with feelings, personal stakes and vivid sensory moments",
            CreativeAngle::Philosophical => "philosophical: explore meaning, questions and reflective insight",
            CreativeAngle::Practical => "practical: focus on concrete lessons, actions and takeaways",
            CreativeAngle::Historical => "historical: ground the story in context, origins and how things came to be",
            CreativeAngle::Analytical => "analytical: examine causes, patterns and evidence step by step",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub label: u32,
    pub angle: CreativeAngle,
}

impl Variant {
    pub fn rotation(count: u32) -> Vec<Variant> {
        (1..=count)
            .map(|label| Variant {
                label,
                angle: CreativeAngle::for_variant(label),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantScript {
    pub label: u32,
    pub angle: CreativeAngle,
    pub text: String,
}

/// Intermediate text artifacts produced by the pipeline prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premise: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_script: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantScript>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCounts {
    pub total: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub state: JobState,
    pub log: Vec<JobLogEntry>,
    pub cells: Vec<Cell>,
    pub scripts: JobScripts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: GenerationRequest) -> Self {
        let now = Utc::now();
        let message = format!(
            "Job queued: '{}' with {} variant(s) across {} language(s)",
            request.title,
            request.variant_count,
            request.target_languages.len()
        );
        Self {
            id: Uuid::new_v4(),
            request,
            state: JobState::Queued,
            log: vec![JobLogEntry::info(Stage::Queue, message)],
            cells: Vec::new(),
            scripts: JobScripts::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cell(&self, key: &CellKey) -> Option<&Cell> {
        self.cells.iter().find(|cell| &cell.key == key)
    }

    pub fn counts(&self) -> CellCounts {
        self.cells.iter().fold(
            CellCounts {
                total: self.cells.len(),
                ..CellCounts::default()
            },
            |mut counts, cell| {
                match cell.outcome {
                    CellOutcome::Pending => counts.pending += 1,
                    CellOutcome::Succeeded(_) => counts.succeeded += 1,
                    CellOutcome::Failed(_) => counts.failed += 1,
                }
                counts
            },
        )
    }

    /// Rough completion percentage: the pipeline prefix is worth 40%,
    /// settled cells the remaining 60%
    pub fn progress(&self) -> u8 {
        if self.state.is_terminal() {
            return 100;
        }
        if self.state == JobState::Queued {
            return 0;
        }

        let prefix_steps = [
            self.scripts.premise.is_some(),
            !self.cells.is_empty(),
            self.scripts.base_script.is_some(),
        ];
        let prefix = prefix_steps.iter().filter(|done| **done).count() as f64 / 3.0 * 40.0;

        let counts = self.counts();
        let cells = if counts.total == 0 {
            0.0
        } else {
            (counts.succeeded + counts.failed) as f64 / counts.total as f64 * 60.0
        };

        (prefix + cells).floor().min(99.0) as u8
    }
}

/// Listing row for recent jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub title: String,
    pub state: JobState,
    pub variant_count: u32,
    pub target_languages: Vec<LanguageCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            title: job.request.title.clone(),
            state: job.state,
            variant_count: job.request.variant_count,
            target_languages: job.request.target_languages.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Expected cells for a request: every variant label times every target language
pub fn resolve_cells(request: &GenerationRequest) -> Vec<CellKey> {
    let mut cells = Vec::with_capacity(request.variant_count as usize * request.target_languages.len());
    for variant in 1..=request.variant_count.max(1) {
        for language in &request.target_languages {
            cells.push(CellKey::new(variant, language.clone()));
        }
    }
    cells
}

/// Terminal state for a job whose pipeline prefix succeeded
pub fn settle(cells: &[Cell]) -> JobState {
    let all_succeeded = cells
        .iter()
        .all(|cell| matches!(cell.outcome, CellOutcome::Succeeded(_)));
    if all_succeeded {
        JobState::Completed
    } else {
        JobState::CompletedWithErrors
    }
}
