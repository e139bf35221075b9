//! Robot message callback
//!
//! Replies to a robot message by echoing its text back to the sender.

use axum::{http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

/// Incoming robot message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMessage {
    pub msgtype: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub create_at: Option<i64>,
}

/// Reply posted back to the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotReply {
    pub msgtype: String,
    pub text: TextContent,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(handle_bot))
}

/// POST /api/v1/bot
async fn handle_bot(Json(message): Json<BotMessage>) -> Result<Json<BotReply>, StatusCode> {
    tracing::debug!(
        msg_id = message.msg_id.as_deref().unwrap_or(""),
        msgtype = %message.msgtype,
        create_at = message.create_at,
        "Robot message received"
    );

    let text = message.text.ok_or(StatusCode::NO_CONTENT)?;

    Ok(Json(BotReply {
        msgtype: "text".to_string(),
        text,
    }))
}
