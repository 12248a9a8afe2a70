use crate::config::{ApiConfig, PlaybackConfig};
use crate::error::{IngestError, LoadError};
use crate::feed_loader::FeedLoader;
use crate::ingest::UploadPipeline;
use crate::metadata_store::MetadataStore;
use crate::model::{UploadFields, VideoRecord};
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Multipart field carrying the video bytes
const VIDEO_FIELD: &str = "video";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub feed_loader: Arc<FeedLoader>,
    pub metadata_store: Arc<dyn MetadataStore>,
    /// Directory served under `/uploads` when blobs live on local disk
    pub uploads_dir: Option<PathBuf>,
    /// Session tuning handed to feed clients
    pub playback: PlaybackConfig,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub video: VideoRecord,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

fn ingest_error(err: &IngestError) -> ApiError {
    let (status, message) = match err {
        IngestError::MissingFile => (StatusCode::BAD_REQUEST, "No video file in upload"),
        IngestError::StorageFailure { .. } => (StatusCode::BAD_GATEWAY, "Failed to store video"),
        IngestError::PersistenceFailure { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save video metadata")
        }
    };
    api_error(status, message, err.code())
}

/// Oversized bodies keep their 413; anything else is a malformed request
fn multipart_error(err: &MultipartError, message: &str) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        api_error(status, "Upload exceeds the size limit", "PAYLOAD_TOO_LARGE")
    } else {
        api_error(StatusCode::BAD_REQUEST, message, "BAD_MULTIPART")
    }
}

fn load_error(err: &LoadError) -> ApiError {
    match err {
        LoadError::Unavailable(_) => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to fetch videos",
            err.code(),
        ),
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/playback-config", get(playback_config))
        .route(
            "/api/videos",
            get(list_videos)
                .post(upload_video)
                .layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        );

    if let Some(ref dir) = state.uploads_dir {
        router = router.nest_service("/uploads", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "feed-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Swipe tuning for feed clients
async fn playback_config(State(state): State<AppState>) -> Json<PlaybackConfig> {
    Json(state.playback)
}

/// Full feed, newest first
#[instrument(skip(state))]
async fn list_videos(State(state): State<AppState>) -> Result<Json<Vec<VideoRecord>>, ApiError> {
    let videos = state.feed_loader.load().await.map_err(|e| load_error(&e))?;
    Ok(Json(videos))
}

/// Accept a multipart upload: `video` file plus optional text fields
#[instrument(skip(state, multipart))]
async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut fields = UploadFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart upload");
        multipart_error(&e, "Malformed multipart body")
    })? {
        let name = field.name().unwrap_or_default().to_string();

        if name == VIDEO_FIELD {
            file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                warn!(error = %e, "Failed to read video field");
                multipart_error(&e, "Failed to read video field")
            })?;
            file = Some(data);
        } else {
            let value = field.text().await.map_err(|e| {
                warn!(error = %e, field = %name, "Failed to read text field");
                multipart_error(&e, "Failed to read form field")
            })?;
            if !fields.set(&name, value) {
                warn!(field = %name, "Ignoring unknown upload field");
            }
        }
    }

    let video = state
        .pipeline
        .ingest(file, file_name.as_deref(), fields)
        .await
        .map_err(|e| {
            error!(error = %e, "Upload failed");
            ingest_error(&e)
        })?;

    Ok(Json(UploadResponse {
        message: "Video uploaded successfully!".to_string(),
        video,
    }))
}

/// Start the feed API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting feed API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
