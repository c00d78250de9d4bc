//! REST API routes

use crate::download::{DownloadItem, RawProgressEvent, TerminalNotification};
use crate::error::{EventError, RegistryError};
use crate::hub::{DownloadsSnapshot, EngineCommand, SyncSnapshot};
use crate::sync::{SyncStage, SyncSummary};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Sync
        .route("/sync", get(get_sync))
        .route("/sync/start", post(start_sync))
        .route("/sync/stage", post(set_stage))
        .route("/sync/categories", post(set_categories))
        .route("/sync/feeds", post(set_feeds))
        .route("/sync/entries", post(set_entries))
        .route("/sync/complete", post(complete_sync))
        .route("/sync/fail", post(fail_sync))
        .route("/sync/error", post(set_error))
        // Downloads
        .route("/downloads", get(list_downloads))
        .route("/downloads/events", post(push_event))
        .route("/downloads/clear-completed", post(clear_completed))
        .route("/downloads/{id}", delete(remove_download))
        .route("/downloads/{id}/cancel", post(cancel_download))
        .route("/downloads/{id}/retry", post(retry_download))
}

// ============ Sync Endpoints ============

async fn get_sync(State(state): State<Arc<AppState>>) -> Json<SyncSnapshot> {
    Json(state.sync.snapshot())
}

async fn start_sync(State(state): State<Arc<AppState>>) -> Json<SyncSnapshot> {
    Json(state.sync.start_sync())
}

#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub stage: String,
}

async fn set_stage(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StageRequest>,
) -> Result<Json<SyncSnapshot>, ApiError> {
    let stage: SyncStage = req.stage.parse()?;
    Ok(Json(state.sync.set_current_stage(stage)))
}

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    pub count: u64,
}

async fn set_categories(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CountRequest>,
) -> Json<SyncSnapshot> {
    Json(state.sync.set_categories_count(req.count))
}

async fn set_feeds(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CountRequest>,
) -> Json<SyncSnapshot> {
    Json(state.sync.set_feeds_count(req.count))
}

#[derive(Debug, Deserialize)]
pub struct EntriesRequest {
    pub pulled: u64,
    pub total: u64,
}

async fn set_entries(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EntriesRequest>,
) -> Json<SyncSnapshot> {
    Json(state.sync.set_entries_progress(req.pulled, req.total))
}

/// Complete the run; the body, when present, is the sync summary
async fn complete_sync(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SyncSnapshot>, ApiError> {
    let summary = if body.is_empty() {
        None
    } else {
        let summary: SyncSummary = serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid sync summary: {}", e)))?;
        Some(summary)
    };

    Ok(Json(state.sync.complete_sync(summary)))
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub message: String,
}

async fn fail_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FailRequest>,
) -> Json<SyncSnapshot> {
    Json(state.sync.fail_sync(req.message))
}

#[derive(Debug, Deserialize)]
pub struct ErrorRequest {
    #[serde(default)]
    pub message: Option<String>,
}

async fn set_error(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ErrorRequest>,
) -> Json<SyncSnapshot> {
    Json(state.sync.set_error(req.message))
}

// ============ Download Endpoints ============

async fn list_downloads(State(state): State<Arc<AppState>>) -> Json<DownloadsSnapshot> {
    Json(state.downloads.snapshot())
}

/// Response after pushing a progress event
#[derive(Debug, Serialize)]
pub struct PushEventResponse {
    pub applied: bool,
    pub item: Option<DownloadItem>,
    pub notification: Option<TerminalNotification>,
}

/// Accept one progress event from the download engine
async fn push_event(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawProgressEvent>,
) -> Result<Response, ApiError> {
    let response = match state.downloads.apply_raw(raw)? {
        Some(applied) => (
            StatusCode::OK,
            Json(PushEventResponse {
                applied: true,
                item: Some(applied.item),
                notification: applied.notification,
            }),
        ),
        None => (
            StatusCode::ACCEPTED,
            Json(PushEventResponse {
                applied: false,
                item: None,
                notification: None,
            }),
        ),
    };

    Ok(response.into_response())
}

async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<EngineCommand>, ApiError> {
    Ok(Json(state.downloads.cancel(id)?))
}

async fn retry_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<EngineCommand>, ApiError> {
    Ok(Json(state.downloads.retry(id)?))
}

/// Remove a download from the list
async fn remove_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.downloads.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_completed(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let removed = state.downloads.clear_completed();
    Json(serde_json::json!({ "removed": removed }))
}

// ============ Error Handling ============

/// API error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}
