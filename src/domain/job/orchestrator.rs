use super::model::{
    resolve_cells, settle, CellFailure, CellKey, CellOutcome, CellOutput, JobLogEntry, JobScripts,
    JobState, Stage,
};
use crate::domain::generation::{
    GenerationRequest, LanguageCheck, LanguageVerifier, PipelineError,
};
use crate::domain::script::{
    CulturalAdapter, GeneratorSettings, NarrativeSegmenter, Provenance, ScriptGenerator,
    SegmenterSettings, VariationExpander,
};
use crate::domain::speech::{estimated_chunk_count, SpeechAssembler};
use crate::error::{AppError, AppResult};
use crate::infrastructure::repositories::{
    AssetRepository, JobRepository, TextGenerationRepository, TtsRepository,
};
use crate::infrastructure::resilience::CallGuard;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Script length assumed per block when the request gives no target length
const DEFAULT_CHARS_PER_BLOCK: usize = 1500;

/// Narration speed used for audio estimates
const CHARS_PER_MINUTE: f64 = 900.0;

/// Tunables for every pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub segmenter: SegmenterSettings,
    pub generator: GeneratorSettings,
    pub variation_temperature: f32,
    pub variation_max_tokens: u32,
    pub adaptation_max_tokens: u32,
    pub synthesis_cache_enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segmenter: SegmenterSettings::default(),
            generator: GeneratorSettings::default(),
            variation_temperature: 1.0,
            variation_max_tokens: 16000,
            adaptation_max_tokens: 8000,
            synthesis_cache_enabled: false,
        }
    }
}

/// Collaborator call volume a request would cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub cells: usize,
    pub blocks: usize,
    pub text_generation_calls: usize,
    pub adaptation_calls: usize,
    pub synthesis_calls: usize,
    pub approximate_script_chars: usize,
    pub approximate_audio_minutes: f64,
}

/// Source script for one variant label, or why there is none
type VariantSources = BTreeMap<u32, Result<String, (Stage, PipelineError)>>;

/// Drives one job from `queued` to a terminal state
pub struct Orchestrator {
    jobs: Arc<dyn JobRepository>,
    segmenter: NarrativeSegmenter,
    generator: ScriptGenerator,
    expander: VariationExpander,
    adapter: CulturalAdapter,
    assembler: SpeechAssembler,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        text_repo: Arc<dyn TextGenerationRepository>,
        tts_repo: Arc<dyn TtsRepository>,
        asset_repo: Arc<dyn AssetRepository>,
        guard: Arc<CallGuard>,
        verifier: Arc<LanguageVerifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            jobs,
            segmenter: NarrativeSegmenter::new(settings.segmenter),
            generator: ScriptGenerator::new(text_repo.clone(), guard.clone(), settings.generator),
            expander: VariationExpander::new(
                text_repo.clone(),
                guard.clone(),
                settings.variation_temperature,
                settings.variation_max_tokens,
            ),
            adapter: CulturalAdapter::new(
                text_repo,
                guard.clone(),
                verifier,
                settings.generator.temperature,
                settings.adaptation_max_tokens,
            ),
            assembler: SpeechAssembler::new(
                tts_repo,
                asset_repo,
                guard,
                settings.synthesis_cache_enabled,
            ),
        }
    }

    /// Work a queued job to completion. Returns the terminal state reached,
    /// or the current state if another party already moved the job.
    pub async fn run(&self, job_id: Uuid, cancel: CancellationToken) -> AppResult<JobState> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;

        if !self
            .jobs
            .transition(job_id, JobState::Queued, JobState::Running)
            .await?
        {
            tracing::info!(job_id = %job_id, state = %job.state, "Job no longer queued, skipping");
            return Ok(job.state);
        }
        self.log(job_id, JobLogEntry::info(Stage::Queue, "Job picked up by worker"))
            .await?;

        match self.execute(job_id, &job.request, &cancel).await {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job aborted by storage failure");
                let entry = JobLogEntry::failure(
                    Stage::Finalize,
                    "Job aborted",
                    &PipelineError::Storage(e.to_string()),
                );
                if let Err(log_err) = self.log(job_id, entry).await {
                    tracing::error!(job_id = %job_id, error = %log_err, "Failed to record abort");
                }
                if let Err(state_err) = self
                    .jobs
                    .transition(job_id, JobState::Running, JobState::Failed)
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %state_err, "Failed to mark job failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> AppResult<JobState> {
        let mut scripts = JobScripts::default();

        let (cells, base_script) = match self.run_prefix(job_id, request, &mut scripts, cancel).await? {
            Ok(prefix) => prefix,
            Err(PipelineError::Cancelled) => return self.finish_cancelled(job_id).await,
            Err(_) => {
                self.jobs
                    .transition(job_id, JobState::Running, JobState::Failed)
                    .await?;
                tracing::warn!(job_id = %job_id, "Job failed before any cell was produced");
                return Ok(JobState::Failed);
            }
        };

        let sources = match self
            .variant_sources(job_id, request, &mut scripts, &base_script, cancel)
            .await?
        {
            Some(sources) => sources,
            None => return self.finish_cancelled(job_id).await,
        };

        let results = join_all(cells.iter().map(|key| {
            let source = sources.get(&key.variant);
            self.run_cell(job_id, request, key, source, cancel)
        }))
        .await;
        for result in results {
            result?;
        }

        if cancel.is_cancelled() {
            return self.finish_cancelled(job_id).await;
        }
        self.finish(job_id).await
    }

    /// Premise, segmentation and base script. The outer result carries
    /// storage failures; the inner one the fatal pipeline error, already logged.
    async fn run_prefix(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
        scripts: &mut JobScripts,
        cancel: &CancellationToken,
    ) -> AppResult<Result<(Vec<CellKey>, String), PipelineError>> {
        // premise
        if cancel.is_cancelled() {
            return Ok(Err(PipelineError::Cancelled));
        }
        self.log(job_id, JobLogEntry::info(Stage::Premise, "Generating premise"))
            .await?;
        let premise = match self.generator.premise(request, cancel).await {
            Ok(premise) => premise,
            Err(e) => return self.fatal(job_id, Stage::Premise, e).await,
        };
        scripts.premise = Some(premise.clone());
        self.jobs.save_scripts(job_id, scripts).await?;
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::Premise,
                format!("Premise ready ({} characters)", premise.chars().count()),
            ),
        )
        .await?;

        // segmentation
        if cancel.is_cancelled() {
            return Ok(Err(PipelineError::Cancelled));
        }
        self.log(job_id, JobLogEntry::info(Stage::Segmentation, "Segmenting block structure"))
            .await?;
        let blocks = match self
            .segmenter
            .segment(&request.block_structure, request.target_length_chars)
        {
            Ok(blocks) => blocks,
            Err(e) => return self.fatal(job_id, Stage::Segmentation, e).await,
        };
        let cells = resolve_cells(request);
        self.jobs.resolve_cells(job_id, &cells).await?;
        scripts.blocks = blocks.clone();
        self.jobs.save_scripts(job_id, scripts).await?;
        let provenance = if blocks.iter().all(|b| b.provenance == Provenance::Explicit) {
            "explicit markers"
        } else {
            "heuristic split"
        };
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::Segmentation,
                format!(
                    "{} block(s) from {}, {} cell(s) resolved",
                    blocks.len(),
                    provenance,
                    cells.len()
                ),
            ),
        )
        .await?;

        // base script
        if cancel.is_cancelled() {
            return Ok(Err(PipelineError::Cancelled));
        }
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::BaseScript,
                format!("Generating base script over {} block(s)", blocks.len()),
            ),
        )
        .await?;
        let base_script = match self
            .generator
            .base_script(request, &premise, &blocks, cancel)
            .await
        {
            Ok(script) => script,
            Err(e) => return self.fatal(job_id, Stage::BaseScript, e).await,
        };
        scripts.base_script = Some(base_script.clone());
        self.jobs.save_scripts(job_id, scripts).await?;
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::BaseScript,
                format!("Base script ready ({} characters)", base_script.chars().count()),
            ),
        )
        .await?;

        Ok(Ok((cells, base_script)))
    }

    async fn fatal<T>(
        &self,
        job_id: Uuid,
        stage: Stage,
        error: PipelineError,
    ) -> AppResult<Result<T, PipelineError>> {
        if error != PipelineError::Cancelled {
            self.log(job_id, JobLogEntry::failure(stage, format!("{} failed", stage), &error))
                .await?;
        }
        Ok(Err(error))
    }

    /// Script per variant label. `None` means the job was cancelled.
    async fn variant_sources(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
        scripts: &mut JobScripts,
        base_script: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Option<VariantSources>> {
        let mut sources = VariantSources::new();
        if request.variant_count <= 1 {
            sources.insert(1, Ok(base_script.to_string()));
            return Ok(Some(sources));
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::Variation,
                format!("Expanding into {} variants", request.variant_count),
            ),
        )
        .await?;

        let premise = scripts.premise.clone().unwrap_or_default();
        match self.expander.expand(request, &premise, base_script, cancel).await {
            Ok((variants, parsed)) => {
                for label in 1..=request.variant_count {
                    let source = match parsed.recovered.get(&label) {
                        Some(text) => Ok(text.clone()),
                        None => Err((
                            Stage::Variation,
                            PipelineError::ParseShortfall {
                                variant: label,
                                recovered: parsed.recovered.len(),
                                expected: parsed.expected,
                            },
                        )),
                    };
                    sources.insert(label, source);
                }
                scripts.variants = variants;
                self.jobs.save_scripts(job_id, scripts).await?;

                let missing = parsed.missing();
                let entry = if parsed.recovered.is_empty() {
                    JobLogEntry::failure(
                        Stage::Variation,
                        "No variants could be parsed from the response",
                        &PipelineError::ParseShortfall {
                            variant: 1,
                            recovered: 0,
                            expected: parsed.expected,
                        },
                    )
                } else if missing.is_empty() {
                    JobLogEntry::info(
                        Stage::Variation,
                        format!("All {} variants parsed", parsed.expected),
                    )
                } else {
                    JobLogEntry {
                        error: Some(format!("missing variants {:?}", missing)),
                        ..JobLogEntry::info(
                            Stage::Variation,
                            format!(
                                "Parsed {} of {} variants, continuing without {:?}",
                                parsed.recovered.len(),
                                parsed.expected,
                                missing
                            ),
                        )
                    }
                };
                self.log(job_id, entry).await?;
            }
            Err(PipelineError::Cancelled) => return Ok(None),
            Err(e) => {
                self.log(
                    job_id,
                    JobLogEntry::failure(Stage::Variation, "Variation expansion failed", &e),
                )
                .await?;
                for label in 1..=request.variant_count {
                    sources.insert(label, Err((Stage::Variation, e.clone())));
                }
            }
        }

        Ok(Some(sources))
    }

    /// Adapt then synthesize one cell. Pipeline failures settle the cell as
    /// failed; only storage errors are returned.
    async fn run_cell(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
        key: &CellKey,
        source: Option<&Result<String, (Stage, PipelineError)>>,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let script = match source {
            Some(Ok(script)) => script,
            Some(Err((stage, error))) => {
                return self
                    .fill(job_id, key, CellOutcome::Failed(CellFailure::new(*stage, error)))
                    .await;
            }
            None => {
                let error = PipelineError::ParseShortfall {
                    variant: key.variant,
                    recovered: 0,
                    expected: request.variant_count,
                };
                return self
                    .fill(job_id, key, CellOutcome::Failed(CellFailure::new(Stage::Variation, &error)))
                    .await;
            }
        };

        if cancel.is_cancelled() {
            return Ok(());
        }
        let adapted = match self
            .adapter
            .adapt(script, &request.base_language, &key.language, &request.prompts, cancel)
            .await
        {
            Ok(adapted) => adapted,
            Err(PipelineError::Cancelled) => return Ok(()),
            Err(e) => {
                self.log(
                    job_id,
                    JobLogEntry::failure(Stage::Adaptation, format!("Cell {} adaptation failed", key), &e),
                )
                .await?;
                return self
                    .fill(job_id, key, CellOutcome::Failed(CellFailure::new(Stage::Adaptation, &e)))
                    .await;
            }
        };

        let message = if adapted.identity {
            format!("Cell {} uses the source script unchanged", key)
        } else {
            format!("Cell {} adapted ({} characters)", key, adapted.text.chars().count())
        };
        let mut entry = JobLogEntry::info(Stage::Adaptation, message);
        if let LanguageCheck::Mismatch { detected } = adapted.check {
            entry.error = Some(format!(
                "warning: adapted text looks like '{}', expected '{}'",
                detected, key.language
            ));
        }
        self.log(job_id, entry).await?;

        if cancel.is_cancelled() {
            return Ok(());
        }
        match self
            .assembler
            .assemble(job_id, key, &adapted.text, &request.speech, cancel)
            .await
        {
            Ok(audio) => {
                self.log(
                    job_id,
                    JobLogEntry::info(
                        Stage::Synthesis,
                        format!(
                            "Cell {} synthesized: {} segment(s), {:.1}s",
                            key,
                            audio.segments.len(),
                            audio.duration_secs
                        ),
                    ),
                )
                .await?;
                self.fill(
                    job_id,
                    key,
                    CellOutcome::Succeeded(CellOutput {
                        adapted_script: adapted.text,
                        audio,
                    }),
                )
                .await
            }
            Err(PipelineError::Cancelled) => Ok(()),
            Err(e) => {
                self.log(
                    job_id,
                    JobLogEntry::failure(Stage::Synthesis, format!("Cell {} synthesis failed", key), &e),
                )
                .await?;
                let failure = CellFailure::new(Stage::Synthesis, &e).with_adapted_script(adapted.text);
                self.fill(job_id, key, CellOutcome::Failed(failure)).await
            }
        }
    }

    async fn fill(&self, job_id: Uuid, key: &CellKey, outcome: CellOutcome) -> AppResult<()> {
        if !self.jobs.fill_cell(job_id, key, &outcome).await? {
            tracing::warn!(job_id = %job_id, cell = %key, "Cell already settled, outcome dropped");
        }
        Ok(())
    }

    async fn finish(&self, job_id: Uuid) -> AppResult<JobState> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;
        let state = settle(&job.cells);
        let counts = job.counts();

        self.log(
            job_id,
            JobLogEntry::info(
                Stage::Finalize,
                format!(
                    "Job {}: {} of {} cell(s) succeeded, {} failed",
                    state, counts.succeeded, counts.total, counts.failed
                ),
            ),
        )
        .await?;
        self.jobs
            .transition(job_id, JobState::Running, state)
            .await?;
        Ok(state)
    }

    async fn finish_cancelled(&self, job_id: Uuid) -> AppResult<JobState> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;

        // every cell settled before the cancel landed, nothing was abandoned
        if !job.cells.is_empty() && job.counts().pending == 0 {
            tracing::info!(job_id = %job_id, "Cancel arrived after all cells settled");
            return self.finish(job_id).await;
        }

        let abandoned = CellOutcome::Failed(CellFailure::new(Stage::Finalize, &PipelineError::Cancelled));
        for cell in job.cells.iter().filter(|cell| cell.outcome.is_pending()) {
            self.fill(job_id, &cell.key, abandoned.clone()).await?;
        }

        let counts = job.counts();
        self.log(
            job_id,
            JobLogEntry::info(
                Stage::Finalize,
                format!(
                    "Job cancelled: {} cell(s) had completed, {} abandoned",
                    counts.succeeded,
                    counts.pending
                ),
            ),
        )
        .await?;
        self.jobs
            .transition(job_id, JobState::Running, JobState::Failed)
            .await?;
        Ok(JobState::Failed)
    }

    async fn log(&self, job_id: Uuid, entry: JobLogEntry) -> AppResult<()> {
        match &entry.error {
            Some(error) => tracing::warn!(
                job_id = %job_id,
                stage = %entry.stage,
                error = %error,
                "{}",
                entry.message
            ),
            None => tracing::info!(job_id = %job_id, stage = %entry.stage, "{}", entry.message),
        }
        self.jobs.append_log(job_id, &entry).await
    }

    /// Collaborator volume for a request, computed without calling anything
    pub fn estimate(&self, request: &GenerationRequest) -> Result<Estimate, PipelineError> {
        let blocks = self
            .segmenter
            .segment(&request.block_structure, request.target_length_chars)?
            .len();
        let cells = resolve_cells(request);
        let adaptation_calls = cells
            .iter()
            .filter(|key| key.language != request.base_language)
            .count();
        let variation_calls = usize::from(request.variant_count > 1);

        let approximate_script_chars = request
            .target_length_chars
            .map(|chars| chars as usize)
            .unwrap_or(blocks * DEFAULT_CHARS_PER_BLOCK);
        let chunks_per_cell = estimated_chunk_count(approximate_script_chars, self.assembler.max_chars());

        Ok(Estimate {
            cells: cells.len(),
            blocks,
            text_generation_calls: 1 + blocks + variation_calls + adaptation_calls,
            adaptation_calls,
            synthesis_calls: cells.len() * chunks_per_cell,
            approximate_script_chars,
            approximate_audio_minutes: cells.len() as f64 * approximate_script_chars as f64
                / CHARS_PER_MINUTE,
        })
    }
}
