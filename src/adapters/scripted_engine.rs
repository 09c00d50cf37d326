//! Deterministic in-process engine used by tests.
//!
//! Emits one segment per second of non-silent audio whose text encodes the
//! model name and the mean amplitude of that second.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::{DecodingConfiguration, SamplingStrategy, TranscriptSegment, SAMPLE_RATE};
use crate::ports::{AlignmentPreset, DeviceOptions, EngineError, InferenceEngine, ModelHandle};

/// What the last decode was asked to do.
#[derive(Debug, Clone)]
pub(crate) struct DecodeRecord {
    pub model: String,
    pub language: String,
    pub strategy: SamplingStrategy,
    pub start_rule: Option<u32>,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptState {
    pub loads: AtomicUsize,
    pub releases: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_decode: Mutex<Option<DecodeRecord>>,
}

pub(crate) struct ScriptedEngine {
    pub state: Arc<ScriptState>,
    chunk_delay: Duration,
    concurrent: bool,
    fail_decode: bool,
    grammar_support: bool,
    missing_alignment: Vec<AlignmentPreset>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ScriptState::default()),
            chunk_delay: Duration::ZERO,
            concurrent: false,
            fail_decode: false,
            grammar_support: true,
            missing_alignment: Vec::new(),
        }
    }

    /// Sleep this long per second of audio, to widen race windows.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_concurrent_decode(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Every decode fails with `EngineError::Decode` once recorded.
    pub fn with_decode_failure(mut self, fail: bool) -> Self {
        self.fail_decode = fail;
        self
    }

    pub fn with_grammar_support(mut self, supported: bool) -> Self {
        self.grammar_support = supported;
        self
    }

    pub fn without_alignment(mut self, preset: AlignmentPreset) -> Self {
        self.missing_alignment.push(preset);
        self
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn language_id(&self, code: &str) -> Option<i32> {
        ["en", "de", "fr", "es"]
            .iter()
            .position(|&l| l == code)
            .map(|i| i as i32)
    }

    fn supports_alignment(&self, preset: AlignmentPreset) -> bool {
        !self.missing_alignment.contains(&preset)
    }

    fn supports_grammar(&self) -> bool {
        self.grammar_support
    }

    fn load_model(
        &self,
        path: &Path,
        _options: &DeviceOptions,
    ) -> Result<Box<dyn ModelHandle>, EngineError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.is_empty() || name.contains("missing") {
            return Err(EngineError::Load(format!(
                "failed to open {}",
                path.display()
            )));
        }

        self.state.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            name,
            state: Arc::clone(&self.state),
            chunk_delay: self.chunk_delay,
            concurrent: self.concurrent,
            fail_decode: self.fail_decode,
        }))
    }
}

struct ScriptedModel {
    name: String,
    state: Arc<ScriptState>,
    chunk_delay: Duration,
    concurrent: bool,
    fail_decode: bool,
}

struct InFlight<'a>(&'a ScriptState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a ScriptState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelHandle for ScriptedModel {
    fn decode(
        &self,
        config: DecodingConfiguration,
        samples: &[f32],
    ) -> Result<Vec<TranscriptSegment>, EngineError> {
        *self.state.last_decode.lock() = Some(DecodeRecord {
            model: self.name.clone(),
            language: config.language.clone(),
            strategy: config.strategy,
            start_rule: config.grammar.as_ref().map(|g| g.start_rule),
        });

        if self.fail_decode {
            return Err(EngineError::Decode("scripted decode failure".to_string()));
        }

        if !config.hooks.encoder_may_begin() {
            return Err(EngineError::Aborted);
        }

        let _guard = InFlight::enter(&self.state);

        let mut segments = Vec::new();
        for (i, chunk) in samples.chunks(SAMPLE_RATE as usize).enumerate() {
            if config.hooks.should_abort() {
                return Err(EngineError::Aborted);
            }
            if !self.chunk_delay.is_zero() {
                std::thread::sleep(self.chunk_delay);
            }

            let mean = chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk.len() as f32;
            if mean > 0.001 {
                let t0 = i as i64 * 100;
                segments.push(TranscriptSegment::new(
                    t0,
                    t0 + 100,
                    format!(" {}:{:.2}", self.name, mean),
                ));
            }
        }

        Ok(segments)
    }

    fn supports_concurrent_decode(&self) -> bool {
        self.concurrent
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}
