//! Upload Routes
//!
//! HTTP endpoints that hand a local file to the upload coordinator.
//!
//! Endpoints:
//! - POST /api/v1/upload - Upload a file, single or chunked by size
//! - POST /api/v1/upload/chunked - Upload a file through a chunked transaction
//! - POST /api/v1/upload/single - Upload a small file in one request
//! - POST /api/v1/upload/media - Upload a message media file
//! - GET /api/v1/upload/sessions - Count tracked upload sessions

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::transport::MediaType;
use crate::upload::{FinalizedHandle, UploadError};

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    /// Path of the file on the server's disk
    pub file_path: String,

    /// Agent to upload as; defaults to the configured agent
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMediaBody {
    pub file_path: String,

    #[serde(default)]
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileResponse {
    pub handle: FinalizedHandle,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCountResponse {
    pub tracked: usize,
    pub active: usize,
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Upload failed");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_file))
        .route("/chunked", post(upload_chunked))
        .route("/single", post(upload_single))
        .route("/media", post(upload_media))
        .route("/sessions", get(session_count))
}

// ============================================================================
// Handlers
// ============================================================================

fn agent_for<'a>(state: &'a AppState, request: &'a UploadFileRequest) -> &'a str {
    request
        .agent_id
        .as_deref()
        .unwrap_or_else(|| state.default_agent_id())
}

/// POST /api/v1/upload
async fn upload_file(
    State(state): State<AppState>,
    Json(request): Json<UploadFileRequest>,
) -> Result<Json<UploadFileResponse>, UploadError> {
    let handle = state
        .coordinator()
        .upload_file(&request.file_path, agent_for(&state, &request))
        .await?;

    Ok(Json(UploadFileResponse { handle }))
}

/// POST /api/v1/upload/chunked
async fn upload_chunked(
    State(state): State<AppState>,
    Json(request): Json<UploadFileRequest>,
) -> Result<Json<UploadFileResponse>, UploadError> {
    let handle = state
        .coordinator()
        .upload_file_in_chunks(&request.file_path, agent_for(&state, &request))
        .await?;

    Ok(Json(UploadFileResponse { handle }))
}

/// POST /api/v1/upload/single
async fn upload_single(
    State(state): State<AppState>,
    Json(request): Json<UploadFileRequest>,
) -> Result<Json<UploadFileResponse>, UploadError> {
    let handle = state
        .coordinator()
        .upload_single(&request.file_path, agent_for(&state, &request))
        .await?;

    Ok(Json(UploadFileResponse { handle }))
}

/// POST /api/v1/upload/media
async fn upload_media(
    State(state): State<AppState>,
    Json(request): Json<UploadMediaBody>,
) -> Result<Json<UploadFileResponse>, UploadError> {
    let handle = state
        .coordinator()
        .upload_media(&request.file_path, request.media_type)
        .await?;

    Ok(Json(UploadFileResponse { handle }))
}

/// GET /api/v1/upload/sessions
async fn session_count(State(state): State<AppState>) -> Json<SessionCountResponse> {
    let tracker = state.coordinator().tracker();
    Json(SessionCountResponse {
        tracked: tracker.len().await,
        active: tracker.active_count().await,
    })
}
