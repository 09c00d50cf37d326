use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::wav;
use crate::domain::diarization::estimate_speaker;
use crate::domain::{
    check_c_text, DecodingConfiguration, DecodingDefaults, DecodingOverrides, LoadError,
    TranscribeError, Transcript, TranscriptSegment,
};
use crate::ports::{EngineError, ModelSpec, ModelStatus, TranscribeRequest, Transcriber};

use super::registry::ModelRegistry;

/// Transcription orchestrator: ingest, decode against the active model,
/// attribute speakers, reduce to a transcript.
pub struct TranscriptionService {
    registry: Arc<ModelRegistry>,
    defaults: DecodingDefaults,
}

impl TranscriptionService {
    pub fn new(registry: Arc<ModelRegistry>, defaults: DecodingDefaults) -> Self {
        Self { registry, defaults }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    fn check_language(&self, language: &str) -> Result<(), TranscribeError> {
        if language != "auto" && self.registry.engine().language_id(language).is_none() {
            return Err(TranscribeError::UnknownLanguage(language.to_string()));
        }
        Ok(())
    }
}

fn check_request_text(language: &str, overrides: &DecodingOverrides) -> Result<(), String> {
    check_c_text("lang", language)?;
    if let Some(prompt) = overrides.initial_prompt.as_deref() {
        check_c_text("prompt", prompt)?;
    }
    if let Some(rule) = overrides.grammar_rule.as_deref() {
        check_c_text("grammar_rule", rule)?;
    }
    Ok(())
}

fn attach_speakers(segments: &mut [TranscriptSegment], left: &[f32], right: &[f32], id_only: bool) {
    for segment in segments.iter_mut() {
        let label = estimate_speaker(left, right, segment.start, segment.end);
        segment.speaker = Some(label.render(id_only));
    }
}

#[async_trait]
impl Transcriber for TranscriptionService {
    async fn reconfigure(&self, spec: ModelSpec) -> Result<ModelStatus, LoadError> {
        self.registry.load(spec).await
    }

    async fn transcribe(
        &self,
        request: TranscribeRequest,
        cancel: CancellationToken,
    ) -> Result<Transcript, TranscribeError> {
        let started = Instant::now();

        let language = request.language.trim().to_string();
        if language.is_empty() {
            return Err(TranscribeError::InvalidRequest(
                "language is required".to_string(),
            ));
        }
        check_request_text(&language, &request.decoding)
            .map_err(TranscribeError::InvalidRequest)?;

        let audio = wav::ingest(&request.audio)?;

        // Held until the decode returns; a reload or unload waits for it.
        let model = self
            .registry
            .acquire()
            .await
            .ok_or(TranscribeError::NoModelLoaded)?;

        self.check_language(&language)?;

        let mut overrides = request.decoding;
        overrides.language = Some(language.clone());
        let mut config = DecodingConfiguration::build(
            &self.defaults,
            &overrides,
            model.grammar(),
            model.grammar_rule(),
            cancel.clone(),
        );
        let engine = self.registry.engine();
        if config.grammar.is_some() && !engine.supports_grammar() {
            warn!(
                backend = engine.name(),
                "Backend cannot bind grammars, skipping grammar sampling"
            );
            config.grammar = None;
            config.warnings.push(format!(
                "{} does not support grammar sampling - skipping grammar sampling",
                engine.name()
            ));
        }
        let warnings = config.warnings.clone();

        info!(
            generation = model.generation(),
            language = %language,
            samples = audio.len(),
            stereo = audio.is_stereo(),
            strategy = ?config.strategy,
            grammar = config.grammar.is_some(),
            "Transcribing"
        );

        let diarize = request.diarize;
        let id_only = request.speaker_id_only;
        let decoded = tokio::task::spawn_blocking(move || {
            let mut segments = model.decode(config, audio.mono())?;

            if diarize {
                match audio.stereo() {
                    Some(channels) => {
                        attach_speakers(&mut segments, &channels.left, &channels.right, id_only)
                    }
                    None => debug!("Diarization requested on mono input, skipping"),
                }
            }
            Ok::<_, EngineError>(segments)
        })
        .await
        .map_err(|e| TranscribeError::InferenceFailed(format!("decode task failed: {}", e)))?;

        let segments = match decoded {
            Ok(segments) => segments,
            Err(EngineError::Aborted) => {
                info!("Transcription cancelled");
                return Err(TranscribeError::Cancelled);
            }
            Err(_) if cancel.is_cancelled() => {
                info!("Transcription cancelled");
                return Err(TranscribeError::Cancelled);
            }
            Err(e) => {
                warn!(error = %e, "Inference failed");
                return Err(TranscribeError::InferenceFailed(e.to_string()));
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let transcript = Transcript::from_segments(segments, language, warnings, duration_ms);

        info!(
            segments = transcript.segments.len(),
            chars = transcript.text.len(),
            duration_ms,
            "Transcription complete"
        );
        Ok(transcript)
    }

    fn model_status(&self) -> Option<ModelStatus> {
        self.registry.status()
    }

    async fn unload_model(&self) -> bool {
        self.registry.unload().await
    }
}
