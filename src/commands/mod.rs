//! HTTP surface: model reconfiguration and transcription endpoints.

pub mod wire;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::{ModelStatus, Transcriber};

pub use wire::{ApiError, ErrorBody, HealthBody, InitModelBody, ResponseFormat, RunDetectionBody};

/// Base64 WAV payloads run far past axum's default body limit.
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct ApiState {
    pub transcriber: Arc<dyn Transcriber>,
}

/// Build the router with all routes.
pub fn router(transcriber: Arc<dyn Transcriber>) -> Router {
    Router::new()
        .route("/init_model", post(init_model))
        .route("/run_detection", post(run_detection))
        .route("/model", get(get_model).delete(delete_model))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ApiState { transcriber })
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            debug!(error = %rejection, "Rejected request body");
            Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_json",
                rejection.body_text(),
            ))
        }
    }
}

/// POST /init_model
async fn init_model(
    State(state): State<ApiState>,
    payload: Result<Json<InitModelBody>, JsonRejection>,
) -> Result<Json<ModelStatus>, ApiError> {
    let spec = json_body(payload)?.into_spec()?;

    match state.transcriber.reconfigure(spec).await {
        Ok(status) => Ok(Json(status)),
        Err(e) => {
            warn!(code = e.code(), error = %e, "Model reconfiguration failed");
            Err(e.into())
        }
    }
}

/// POST /run_detection
///
/// The request's cancellation token is cancelled when this future is dropped,
/// which happens when the client disconnects.
async fn run_detection(
    State(state): State<ApiState>,
    payload: Result<Json<RunDetectionBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (request, format) = json_body(payload)?.into_request()?;

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let transcript = state.transcriber.transcribe(request, cancel).await?;

    Ok(match format {
        ResponseFormat::Text => transcript.text.into_response(),
        ResponseFormat::Json => Json(transcript).into_response(),
    })
}

/// GET /model
async fn get_model(State(state): State<ApiState>) -> Result<Json<ModelStatus>, ApiError> {
    state
        .transcriber
        .model_status()
        .map(Json)
        .ok_or_else(ApiError::no_model)
}

/// DELETE /model
async fn delete_model(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    if state.transcriber.unload_model().await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::no_model())
    }
}

/// GET /health
async fn health(State(state): State<ApiState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        model_loaded: state.transcriber.model_status().is_some(),
    })
}
