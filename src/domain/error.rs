use thiserror::Error;

use crate::domain::grammar::GrammarError;

/// Coarse failure class, used by callers to decide whether to retry,
/// fix the request, or reconfigure the model first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad request input. Safe to retry after correcting it.
    Validation,
    /// No model is loaded yet.
    NotReady,
    /// Model or grammar could not be materialized.
    Resource,
    /// The engine failed or was cancelled mid-call.
    Inference,
}

/// Application-level errors (configuration, IO, logging setup).
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

/// Failures while decoding a transport audio payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Audio payload is not valid base64: {0}")]
    Encoding(String),

    #[error("Audio payload is not a readable WAV container: {0}")]
    Container(String),

    #[error("Unsupported WAV format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported sample rate {0}Hz, expected 16000Hz")]
    UnsupportedSampleRate(u32),

    #[error("Audio payload contains no samples")]
    Empty,
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Encoding(_) => "invalid_audio_encoding",
            IngestError::Container(_) => "invalid_audio_container",
            IngestError::UnsupportedFormat(_) => "unsupported_audio_format",
            IngestError::UnsupportedSampleRate(_) => "unsupported_sample_rate",
            IngestError::Empty => "empty_audio",
        }
    }
}

/// Failures while (re)configuring the active model.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown language '{0}'")]
    UnknownLanguage(String),

    #[error("Unknown alignment preset '{0}'")]
    UnknownAlignmentPreset(String),

    #[error("Failed to load model {path}: {reason}")]
    ModelLoadFailed { path: String, reason: String },

    #[error("Failed to compile grammar: {0}")]
    GrammarCompileFailed(#[from] GrammarError),
}

impl LoadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LoadError::InvalidRequest(_)
            | LoadError::UnknownLanguage(_)
            | LoadError::UnknownAlignmentPreset(_) => ErrorClass::Validation,
            LoadError::ModelLoadFailed { .. } | LoadError::GrammarCompileFailed(_) => {
                ErrorClass::Resource
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LoadError::InvalidRequest(_) => "invalid_request",
            LoadError::UnknownLanguage(_) => "unknown_language",
            LoadError::UnknownAlignmentPreset(_) => "unknown_alignment_preset",
            LoadError::ModelLoadFailed { .. } => "model_load_failed",
            LoadError::GrammarCompileFailed(_) => "grammar_compile_failed",
        }
    }
}

/// Failures of a single transcription request.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown language '{0}'")]
    UnknownLanguage(String),

    #[error("Audio decode failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl TranscribeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TranscribeError::InvalidRequest(_)
            | TranscribeError::UnknownLanguage(_)
            | TranscribeError::Ingest(_) => ErrorClass::Validation,
            TranscribeError::NoModelLoaded => ErrorClass::NotReady,
            TranscribeError::Cancelled | TranscribeError::InferenceFailed(_) => {
                ErrorClass::Inference
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TranscribeError::InvalidRequest(_) => "invalid_request",
            TranscribeError::UnknownLanguage(_) => "unknown_language",
            TranscribeError::Ingest(e) => e.code(),
            TranscribeError::NoModelLoaded => "no_model_loaded",
            TranscribeError::Cancelled => "cancelled",
            TranscribeError::InferenceFailed(_) => "inference_failed",
        }
    }
}
