use std::path::Path;

use tracing::{debug, info};
use whisper_rs::{
    DtwMode, DtwModelPreset, DtwParameters, FullParams, SamplingStrategy as WhisperStrategy,
    WhisperContext, WhisperContextParameters,
};

use crate::domain::{DecodingConfiguration, SamplingStrategy, TranscriptSegment};
use crate::ports::{AlignmentPreset, DeviceOptions, EngineError, InferenceEngine, ModelHandle};

/// Working memory reserved for DTW token alignment.
const DTW_MEM_SIZE: usize = 128 * 1024 * 1024;

/// Inference engine backed by whisper.cpp via whisper-rs.
pub struct WhisperCppEngine {
    parallel_states: bool,
}

impl WhisperCppEngine {
    /// Create a new engine.
    ///
    /// With `parallel_states`, every decode gets its own whisper state and
    /// decodes on one model may run concurrently.
    pub fn new(parallel_states: bool) -> Self {
        info!(parallel_states, "WhisperCppEngine created");
        Self { parallel_states }
    }

    /// whisper-rs 0.13 has no alignment heads for large-v3-turbo.
    fn dtw_preset(preset: AlignmentPreset) -> Option<DtwModelPreset> {
        let preset = match preset {
            AlignmentPreset::TinyEn => DtwModelPreset::TinyEn,
            AlignmentPreset::Tiny => DtwModelPreset::Tiny,
            AlignmentPreset::BaseEn => DtwModelPreset::BaseEn,
            AlignmentPreset::Base => DtwModelPreset::Base,
            AlignmentPreset::SmallEn => DtwModelPreset::SmallEn,
            AlignmentPreset::Small => DtwModelPreset::Small,
            AlignmentPreset::MediumEn => DtwModelPreset::MediumEn,
            AlignmentPreset::Medium => DtwModelPreset::Medium,
            AlignmentPreset::LargeV1 => DtwModelPreset::LargeV1,
            AlignmentPreset::LargeV2 => DtwModelPreset::LargeV2,
            AlignmentPreset::LargeV3 => DtwModelPreset::LargeV3,
            AlignmentPreset::LargeV3Turbo => return None,
        };
        Some(preset)
    }
}

impl InferenceEngine for WhisperCppEngine {
    fn name(&self) -> &str {
        "whisper.cpp"
    }

    fn language_id(&self, code: &str) -> Option<i32> {
        if code.contains('\0') {
            return None;
        }
        whisper_rs::get_lang_id(code).map(|id| id as i32)
    }

    fn supports_alignment(&self, preset: AlignmentPreset) -> bool {
        Self::dtw_preset(preset).is_some()
    }

    // whisper-rs 0.13 hands whisper.cpp one flat element array where it
    // expects an array of rule pointers, so grammars are never bound here.
    fn supports_grammar(&self) -> bool {
        false
    }

    fn load_model(
        &self,
        path: &Path,
        options: &DeviceOptions,
    ) -> Result<Box<dyn ModelHandle>, EngineError> {
        if !path.exists() {
            return Err(EngineError::Load(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let mut params = WhisperContextParameters::default();
        params.use_gpu(options.use_gpu);
        params.flash_attn(options.flash_attn);
        params.gpu_device(options.gpu_device);

        if let Some(preset) = options.alignment {
            let model_preset = Self::dtw_preset(preset).ok_or_else(|| {
                EngineError::Load(format!("alignment preset '{}' is not available", preset))
            })?;
            params.dtw_parameters(DtwParameters {
                mode: DtwMode::ModelPreset { model_preset },
                dtw_mem_size: DTW_MEM_SIZE,
            });
        }

        let path_str = path.to_string_lossy().to_string();
        let ctx = WhisperContext::new_with_params(&path_str, params)
            .map_err(|e| EngineError::Load(e.to_string()))?;

        info!(path = %path_str, use_gpu = options.use_gpu, "Whisper context initialized");

        Ok(Box::new(WhisperCppModel {
            ctx,
            parallel_states: self.parallel_states,
        }))
    }
}

struct WhisperCppModel {
    ctx: WhisperContext,
    parallel_states: bool,
}

impl ModelHandle for WhisperCppModel {
    fn decode(
        &self,
        config: DecodingConfiguration,
        samples: &[f32],
    ) -> Result<Vec<TranscriptSegment>, EngineError> {
        // whisper-rs exposes neither hook soundly. Cancellation is polled
        // before full() and checked again once it returns.
        if !config.hooks.encoder_may_begin() {
            return Err(EngineError::Aborted);
        }

        let strategy = match config.strategy {
            SamplingStrategy::Greedy { best_of } => WhisperStrategy::Greedy {
                best_of: best_of as i32,
            },
            SamplingStrategy::BeamSearch {
                beam_size,
                patience,
            } => WhisperStrategy::BeamSearch {
                beam_size: beam_size as i32,
                patience,
            },
        };

        let mut params = FullParams::new(strategy);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        params.set_n_threads(config.threads as i32);
        params.set_translate(config.translate);
        params.set_detect_language(config.detect_language);
        if config.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&config.language));
        }
        params.set_offset_ms(config.offset_ms as i32);
        params.set_duration_ms(config.duration_ms as i32);
        params.set_thold_pt(config.word_threshold);
        params.set_max_len(config.max_segment_len as i32);
        params.set_split_on_word(config.split_on_word);
        params.set_audio_ctx(config.audio_ctx as i32);
        params.set_temperature(config.temperature);
        params.set_temperature_inc(config.temperature_inc);
        params.set_entropy_thold(config.entropy_threshold);
        params.set_logprob_thold(config.logprob_threshold);
        if let Some(prompt) = config.initial_prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| EngineError::Decode(format!("failed to create state: {}", e)))?;

        debug!(samples = samples.len(), threads = config.threads, "Running whisper full decode");

        if let Err(e) = state.full(params, samples) {
            if config.hooks.is_cancelled() {
                return Err(EngineError::Aborted);
            }
            return Err(EngineError::Decode(e.to_string()));
        }
        if config.hooks.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        let n_segments = state
            .full_n_segments()
            .map_err(|e| EngineError::Decode(format!("failed to get segment count: {}", e)))?;

        let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
        for i in 0..n_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| EngineError::Decode(format!("segment {} text: {}", i, e)))?;
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(|e| EngineError::Decode(format!("segment {} t0: {}", i, e)))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(|e| EngineError::Decode(format!("segment {} t1: {}", i, e)))?;
            segments.push(TranscriptSegment::new(t0, t1, text));
        }

        Ok(segments)
    }

    fn supports_concurrent_decode(&self) -> bool {
        self.parallel_states
    }
}
