//! Corporation-level routes
//!
//! Endpoints:
//! - POST /api/v1/callback - Register the address book event callback
//! - GET /api/v1/microapps - List the corporation's micro apps

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::transport::{MicroappListResponse, RegisterCallbackRequest, TransportError};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PlatformError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::Transport(TransportError::Api { .. }) => "PLATFORM_REJECTED",
            Self::Transport(TransportError::Malformed(_)) => "MALFORMED_RESPONSE",
            Self::Transport(_) => "PLATFORM_UNAVAILABLE",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        tracing::warn!(error = %self, "Platform call failed");

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Overrides for the configured callback registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCallbackBody {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCallbackReply {
    pub url: String,
    pub tags: Vec<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/callback", post(register_callback))
        .route("/api/v1/microapps", get(list_microapps))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/callback
async fn register_callback(
    State(state): State<AppState>,
    body: Option<Json<RegisterCallbackBody>>,
) -> Result<Json<RegisterCallbackReply>, PlatformError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let callback = &state.config().callback;

    let url = body
        .url
        .or_else(|| callback.url.clone())
        .ok_or(PlatformError::NotConfigured("DINGTALK_CALLBACK_URL"))?;
    let tags = body.tags.unwrap_or_else(|| callback.tags.clone());

    let request = RegisterCallbackRequest {
        call_back_tag: tags.clone(),
        token: callback.token.clone(),
        aes_key: callback.aes_key.clone(),
        url: url.clone(),
    };
    state.platform().register_callback(&request).await?;

    tracing::info!(url = %url, tags = ?tags, "Event callback registered");

    Ok(Json(RegisterCallbackReply { url, tags }))
}

/// GET /api/v1/microapps
async fn list_microapps(
    State(state): State<AppState>,
) -> Result<Json<MicroappListResponse>, PlatformError> {
    let apps = state.platform().list_microapps().await?;
    Ok(Json(apps))
}
