//! Request and response bodies of the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{DecodingOverrides, ErrorClass, LoadError, TranscribeError};
use crate::ports::{ModelSpec, TranscribeRequest};

/// `POST /init_model` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InitModelBody {
    pub modelpath: Option<String>,
    pub lang: Option<String>,
    /// Inline grammar or path to a grammar file.
    pub grammar: Option<String>,
    pub grammar_rule: Option<String>,
    pub use_gpu: Option<bool>,
    pub flash_attn: Option<bool>,
    pub gpu_device: Option<i32>,
    /// Alignment-heads preset name.
    pub dtw: Option<String>,
}

impl InitModelBody {
    pub fn into_spec(self) -> Result<ModelSpec, ApiError> {
        let modelpath = required(self.modelpath, "modelpath")?;
        let lang = required(self.lang, "lang")?;

        let mut spec = ModelSpec::new(modelpath, lang);
        spec.grammar = self.grammar;
        spec.grammar_rule = self.grammar_rule;
        spec.use_gpu = self.use_gpu.unwrap_or(spec.use_gpu);
        spec.flash_attn = self.flash_attn.unwrap_or(spec.flash_attn);
        spec.gpu_device = self.gpu_device.unwrap_or(spec.gpu_device);
        spec.alignment_preset = self.dtw;
        Ok(spec)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Plain concatenated transcript.
    #[default]
    Text,
    /// Structured transcript with segments.
    Json,
}

/// `POST /run_detection` body.
#[derive(Debug, Default, Deserialize)]
pub struct RunDetectionBody {
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub wavdata: Option<String>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub diarize: bool,
    #[serde(default)]
    pub speaker_id_only: bool,
    #[serde(flatten)]
    pub decoding: DecodingOverrides,
}

impl RunDetectionBody {
    pub fn into_request(self) -> Result<(TranscribeRequest, ResponseFormat), ApiError> {
        let language = required(self.lang, "lang")?;
        let audio = required(self.wavdata, "wavdata")?;

        let request = TranscribeRequest {
            language,
            audio,
            decoding: self.decoding,
            diarize: self.diarize,
            speaker_id_only: self.speaker_id_only,
        };
        Ok((request, self.response_format))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("missing required field '{}'", field),
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Error response: status plus a `{code, message}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn no_model() -> Self {
        Self::new(StatusCode::NOT_FOUND, "no_model_loaded", "No model loaded")
    }
}

fn class_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotReady => StatusCode::CONFLICT,
        ErrorClass::Resource | ErrorClass::Inference => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        let status = match err {
            LoadError::GrammarCompileFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => class_status(err.class()),
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<TranscribeError> for ApiError {
    fn from(err: TranscribeError) -> Self {
        let status = match err {
            TranscribeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => class_status(err.class()),
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
