use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{DecodingOverrides, LoadError, TranscribeError, Transcript};

/// Model (re)configuration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_path: PathBuf,
    /// Language code, or "auto".
    pub language: String,
    /// Inline grammar text or path to a grammar file.
    pub grammar: Option<String>,
    /// Default start rule for grammar-constrained decoding.
    pub grammar_rule: Option<String>,
    pub use_gpu: bool,
    pub flash_attn: bool,
    pub gpu_device: i32,
    /// Alignment-heads preset name for token-level timestamps.
    pub alignment_preset: Option<String>,
}

impl ModelSpec {
    pub fn new(model_path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            language: language.into(),
            grammar: None,
            grammar_rule: None,
            use_gpu: true,
            flash_attn: false,
            gpu_device: 0,
            alignment_preset: None,
        }
    }
}

/// Observable state of the active model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_path: String,
    pub language: String,
    /// Number of compiled grammar rules (0 = no grammar bound).
    pub grammar_rules: usize,
    pub grammar_rule: Option<String>,
    /// Incremented on every successful reconfiguration.
    pub generation: u64,
    pub backend: String,
}

/// A single transcription request.
#[derive(Debug, Clone, Default)]
pub struct TranscribeRequest {
    /// Language code for this request, or "auto".
    pub language: String,
    /// Base64-encoded WAV payload.
    pub audio: String,
    pub decoding: DecodingOverrides,
    /// Attach per-segment speaker labels for stereo input.
    pub diarize: bool,
    /// Render speaker labels as bare ids instead of `(speaker N)`.
    pub speaker_id_only: bool,
}

/// Port for the transcription service consumed by the transport layer.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Load a model and swap it in as the active one.
    async fn reconfigure(&self, spec: ModelSpec) -> Result<ModelStatus, LoadError>;

    /// Transcribe one audio payload with the active model.
    ///
    /// `cancel` belongs to this request only; cancelling it aborts this
    /// call's inference and nothing else.
    async fn transcribe(
        &self,
        request: TranscribeRequest,
        cancel: CancellationToken,
    ) -> Result<Transcript, TranscribeError>;

    /// Get the active model status, if a model is loaded.
    fn model_status(&self) -> Option<ModelStatus>;

    /// Unload the active model once in-flight decodes on it have returned.
    /// Returns whether one was loaded.
    async fn unload_model(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec_defaults() {
        let spec = ModelSpec::new("models/ggml-base.en.bin", "auto");
        assert_eq!(spec.language, "auto");
        assert!(spec.use_gpu);
        assert!(spec.grammar.is_none());
        assert!(spec.alignment_preset.is_none());
    }
}
