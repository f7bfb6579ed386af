//! HTTP boundary consumed by the front-end.
//!
//! - POST /recognize_face - multipart upload (`file` or `image` field)
//! - POST /reload         - rebuild the gallery and swap it in
//! - GET  /status         - gallery and configuration summary

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::store::GalleryStore;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use facematch_core::{Gallery, RecognizeError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Multipart field names accepted for the uploaded photo.
const IMAGE_FIELDS: [&str; 2] = ["file", "image"];

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub gallery: Arc<GalleryStore>,
    pub gallery_dir: PathBuf,
    pub threshold: f32,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(engine: EngineHandle, config: &Config) -> Self {
        Self {
            engine,
            gallery: Arc::new(GalleryStore::new()),
            gallery_dir: config.gallery_dir.clone(),
            threshold: config.match_threshold,
            request_timeout: config.request_timeout(),
        }
    }

    /// Build a gallery from the configured directory and put it into service.
    pub async fn reload_gallery(&self) -> Result<Arc<Gallery>, EngineError> {
        let gallery = self.engine.build_gallery(self.gallery_dir.clone()).await?;
        Ok(self.gallery.install(gallery))
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/recognize_face", post(recognize_face))
        .route("/reload", post(reload))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct RecognizeResponse {
    matched_character: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: &'static str,
    gallery_loaded: bool,
    entries: usize,
    dimension: Option<usize>,
    built_at: Option<String>,
    gallery_dir: String,
    threshold: f32,
    workers: usize,
}

impl StatusResponse {
    fn of(state: &AppState) -> Self {
        let gallery = state.gallery.snapshot();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            gallery_loaded: gallery.is_some(),
            entries: gallery.as_ref().map_or(0, |g| g.len()),
            dimension: gallery.as_ref().and_then(|g| g.dimension()),
            built_at: gallery.as_ref().map(|g| g.built_at().to_rfc3339()),
            gallery_dir: state.gallery_dir.display().to_string(),
            threshold: state.threshold,
            workers: state.engine.workers(),
        }
    }
}

/// Request failures, each rendered as `{"error": "..."}` with its own status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file part")]
    MissingFile,
    #[error("invalid upload: {}", .0.body_text())]
    Upload(#[from] MultipartError),
    #[error("Encodings not loaded")]
    NotReady,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Upload(err) => err.status(),
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(EngineError::Recognize(RecognizeError::NoFaceFound)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(EngineError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn recognize_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::MissingFile)?;
    let image = read_image(&mut multipart).await?.ok_or(ApiError::MissingFile)?;
    let gallery = state.gallery.snapshot().ok_or(ApiError::NotReady)?;

    let result = state
        .engine
        .recognize(image, gallery, state.threshold, state.request_timeout)
        .await?;

    tracing::info!(
        matched = result.label(),
        distance = ?result.distance,
        "recognize_face"
    );
    Ok(Json(RecognizeResponse {
        matched_character: result.label().to_string(),
    }))
}

/// Bytes of the first non-empty image field, if any.
async fn read_image(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let is_image = field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name));
        if !is_image {
            continue;
        }
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

async fn reload(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.reload_gallery().await?;
    Ok(Json(StatusResponse::of(&state)))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::of(&state))
}
