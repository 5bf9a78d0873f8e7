use super::chunker::split_into_chunks;
use crate::domain::generation::{PipelineError, ProviderError, SpeechSettings};
use crate::domain::job::{AudioAsset, CellKey, SegmentHandle};
use crate::infrastructure::repositories::{AssetRepository, SpeechRequest, SynthesizedSpeech, TtsRepository};
use crate::infrastructure::resilience::CallGuard;
use futures::stream::{FuturesUnordered, StreamExt};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Chunks a script, synthesizes the chunks concurrently and stores the
/// audio concatenated in chunk order
pub struct SpeechAssembler {
    tts_repo: Arc<dyn TtsRepository>,
    asset_repo: Arc<dyn AssetRepository>,
    guard: Arc<CallGuard>,
    cache: Option<Cache<String, SynthesizedSpeech>>,
}

impl SpeechAssembler {
    pub fn new(
        tts_repo: Arc<dyn TtsRepository>,
        asset_repo: Arc<dyn AssetRepository>,
        guard: Arc<CallGuard>,
        cache_enabled: bool,
    ) -> Self {
        let cache = if cache_enabled {
            Some(
                Cache::builder()
                    .max_capacity(500)
                    .time_to_idle(Duration::from_secs(30 * 60)) // 30 minutes, refreshes on access
                    .build(),
            )
        } else {
            None
        };

        Self {
            tts_repo,
            asset_repo,
            guard,
            cache,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.tts_repo.max_chars()
    }

    pub async fn assemble(
        &self,
        job_id: Uuid,
        key: &CellKey,
        script: &str,
        speech: &SpeechSettings,
        cancel: &CancellationToken,
    ) -> Result<AudioAsset, PipelineError> {
        let start_time = std::time::Instant::now();
        let chunks = split_into_chunks(script, self.tts_repo.max_chars());
        if chunks.is_empty() {
            return Err(PipelineError::synthesis(
                0,
                ProviderError::Rejected("script is empty".to_string()),
            ));
        }

        let voice = speech
            .voice_for(&key.language)
            .map(str::to_string)
            .unwrap_or_else(|| self.tts_repo.default_voice(&key.language));

        tracing::info!(
            variant = key.variant,
            language = %key.language,
            voice = %voice,
            chunks = chunks.len(),
            script_chars = script.chars().count(),
            "Synthesizing cell audio"
        );

        let mut pending: FuturesUnordered<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let request = SpeechRequest {
                    text: text.clone(),
                    language: key.language.clone(),
                    voice: Some(voice.clone()),
                    rate: speech.rate,
                    pitch: speech.pitch,
                };
                async move {
                    let result = self.synthesize_chunk(index, &request, cancel).await;
                    (index, result)
                }
            })
            .collect();

        let mut segments: Vec<Option<SynthesizedSpeech>> = vec![None; chunks.len()];
        while let Some((index, result)) = pending.next().await {
            let speech = result.map_err(|e| PipelineError::synthesis(index, e))?;
            tracing::debug!(
                variant = key.variant,
                language = %key.language,
                chunk_index = index,
                audio_size_bytes = speech.audio.len(),
                "Chunk synthesized"
            );
            segments[index] = Some(speech);
        }

        let mut audio = Vec::new();
        let mut handles = Vec::with_capacity(segments.len());
        let mut duration_secs = 0.0;
        let mut provider_voice = None;
        for (index, segment) in segments.into_iter().enumerate() {
            let segment = segment.ok_or_else(|| {
                PipelineError::synthesis(index, ProviderError::Unavailable("chunk missing".to_string()))
            })?;
            provider_voice.get_or_insert_with(|| segment.voice.clone());
            handles.push(SegmentHandle {
                index,
                byte_offset: audio.len() as u64,
                byte_len: segment.audio.len() as u64,
                char_count: chunks[index].chars().count(),
                duration_secs: segment.duration_secs,
            });
            duration_secs += segment.duration_secs;
            audio.extend_from_slice(&segment.audio);
        }

        let location = self
            .asset_repo
            .store(job_id, key, &audio)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        tracing::info!(
            variant = key.variant,
            language = %key.language,
            location = %location,
            chunks = handles.len(),
            audio_size_bytes = audio.len(),
            duration_secs,
            latency_ms = start_time.elapsed().as_millis(),
            "Cell audio assembled"
        );

        Ok(AudioAsset {
            location,
            // the provider may resolve the requested voice to another id
            voice: provider_voice.unwrap_or(voice),
            size_bytes: audio.len() as u64,
            duration_secs,
            segments: handles,
        })
    }

    async fn synthesize_chunk(
        &self,
        index: usize,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedSpeech, ProviderError> {
        let cache_key = cache_key(request);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                tracing::debug!(chunk_index = index, "Synthesis cache hit");
                return Ok(cached);
            }
        }

        let label = format!("synthesis:{}", request.language);
        let speech = self
            .guard
            .call(&label, cancel, || self.tts_repo.synthesize(request))
            .await?;

        if let Some(cache) = &self.cache {
            cache.insert(cache_key, speech.clone()).await;
        }
        Ok(speech)
    }
}

fn cache_key(request: &SpeechRequest) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        request.voice.as_deref().unwrap_or_default(),
        request.rate,
        request.pitch,
        request.language,
        request.text
    )
}

/// Number of synthesis calls a script of `chars` characters needs
pub fn estimated_chunk_count(chars: usize, max_chars: usize) -> usize {
    chars.div_ceil(max_chars.max(1)).max(1)
}
