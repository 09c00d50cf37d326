use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DecodingConfiguration, TranscriptSegment};

/// Alignment-heads preset enabling token-level timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlignmentPreset {
    TinyEn,
    Tiny,
    BaseEn,
    Base,
    SmallEn,
    Small,
    MediumEn,
    Medium,
    LargeV1,
    LargeV2,
    LargeV3,
    LargeV3Turbo,
}

impl AlignmentPreset {
    const ALL: [AlignmentPreset; 12] = [
        AlignmentPreset::TinyEn,
        AlignmentPreset::Tiny,
        AlignmentPreset::BaseEn,
        AlignmentPreset::Base,
        AlignmentPreset::SmallEn,
        AlignmentPreset::Small,
        AlignmentPreset::MediumEn,
        AlignmentPreset::Medium,
        AlignmentPreset::LargeV1,
        AlignmentPreset::LargeV2,
        AlignmentPreset::LargeV3,
        AlignmentPreset::LargeV3Turbo,
    ];

    /// Get the preset name as used in requests.
    pub fn name(&self) -> &'static str {
        match self {
            AlignmentPreset::TinyEn => "tiny.en",
            AlignmentPreset::Tiny => "tiny",
            AlignmentPreset::BaseEn => "base.en",
            AlignmentPreset::Base => "base",
            AlignmentPreset::SmallEn => "small.en",
            AlignmentPreset::Small => "small",
            AlignmentPreset::MediumEn => "medium.en",
            AlignmentPreset::Medium => "medium",
            AlignmentPreset::LargeV1 => "large.v1",
            AlignmentPreset::LargeV2 => "large.v2",
            AlignmentPreset::LargeV3 => "large.v3",
            AlignmentPreset::LargeV3Turbo => "large.v3.turbo",
        }
    }

    /// Parse a preset from its name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for AlignmentPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Device and precision options for loading a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOptions {
    pub use_gpu: bool,
    pub flash_attn: bool,
    pub gpu_device: i32,
    pub alignment: Option<AlignmentPreset>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            use_gpu: true,
            flash_attn: false,
            gpu_device: 0,
            alignment: None,
        }
    }
}

/// Errors reported by the inference engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Decode aborted")]
    Aborted,
}

/// Port for the speech inference engine.
///
/// Calls block for the duration of the work; callers run them on the
/// blocking thread pool.
pub trait InferenceEngine: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Look up the engine's id for a language code.
    fn language_id(&self, code: &str) -> Option<i32>;

    /// Whether the backend ships alignment heads for `preset`.
    fn supports_alignment(&self, _preset: AlignmentPreset) -> bool {
        true
    }

    /// Whether the backend can constrain decoding with a compiled grammar.
    /// When it can't, grammar bindings are dropped before `decode`.
    fn supports_grammar(&self) -> bool {
        true
    }

    /// Materialize a model handle from a file.
    fn load_model(
        &self,
        path: &Path,
        options: &DeviceOptions,
    ) -> Result<Box<dyn ModelHandle>, EngineError>;
}

/// A loaded model. The engine releases it on drop.
pub trait ModelHandle: Send + Sync {
    /// Run full-context decoding over 16kHz mono samples.
    ///
    /// Segments are returned in emission order, copied out of engine buffers.
    /// The engine must poll `config.hooks` and return `EngineError::Aborted`
    /// when asked to stop.
    fn decode(
        &self,
        config: DecodingConfiguration,
        samples: &[f32],
    ) -> Result<Vec<TranscriptSegment>, EngineError>;

    /// Whether `decode` may run concurrently on this handle.
    fn supports_concurrent_decode(&self) -> bool {
        false
    }
}
