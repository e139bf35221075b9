//! Typed request and reply records for the open API
//!
//! Every reply carries `errcode`/`errmsg`; a non-zero `errcode` is a refusal
//! by the platform, anything that does not parse is malformed.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::upload::UploadId;

// ============================================================================
// Errors
// ============================================================================

/// Transport error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

// ============================================================================
// Requests
// ============================================================================

/// Open a chunked upload transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTransactionRequest {
    pub agent_id: String,
    pub file_size: u64,
    pub chunk_numbers: u32,
}

impl OpenTransactionRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("agent_id", self.agent_id.clone()),
            ("file_size", self.file_size.to_string()),
            ("chunk_numbers", self.chunk_numbers.to_string()),
        ]
    }
}

/// Send one chunk of an open transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunkRequest {
    pub agent_id: String,
    pub upload_id: UploadId,
    pub chunk_sequence: u32,
}

impl UploadChunkRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("agent_id", self.agent_id.clone()),
            ("upload_id", self.upload_id.to_string()),
            ("chunk_sequence", self.chunk_sequence.to_string()),
        ]
    }
}

/// Commit a transaction, repeating the declared size and count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTransactionRequest {
    pub agent_id: String,
    pub upload_id: UploadId,
    pub file_size: u64,
    pub chunk_numbers: u32,
}

impl CommitTransactionRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("agent_id", self.agent_id.clone()),
            ("file_size", self.file_size.to_string()),
            ("chunk_numbers", self.chunk_numbers.to_string()),
            ("upload_id", self.upload_id.to_string()),
        ]
    }
}

/// Upload a whole file in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSingleRequest {
    pub agent_id: String,
    pub file_size: u64,
}

impl UploadSingleRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("agent_id", self.agent_id.clone()),
            ("file_size", self.file_size.to_string()),
        ]
    }
}

/// Kind of message media, with the platform's size limit for each
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Voice,
    Video,
    File,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn max_size(&self) -> u64 {
        match self {
            Self::Image => 1024 * 1024,
            Self::Voice => 2 * 1024 * 1024,
            Self::Video | Self::File => 10 * 1024 * 1024,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload a message media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMediaRequest {
    pub media_type: MediaType,
}

impl UploadMediaRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![("type", self.media_type.to_string())]
    }
}

/// Register the URL the platform posts address book events to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterCallbackRequest {
    pub call_back_tag: Vec<String>,
    pub token: String,
    pub aes_key: String,
    pub url: String,
}

// ============================================================================
// Replies
// ============================================================================

/// A reply body that can check its own required fields
pub trait ApiReply: DeserializeOwned {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenTransactionResponse {
    pub upload_id: String,
}

impl ApiReply for OpenTransactionResponse {
    fn validate(&self) -> Result<(), String> {
        if self.upload_id.trim().is_empty() {
            return Err("empty upload_id".to_string());
        }
        Ok(())
    }
}

/// Chunk replies carry nothing beyond the status fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadChunkResponse {}

impl ApiReply for UploadChunkResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitTransactionResponse {
    #[serde(alias = "media_id")]
    pub file_id: String,
}

impl ApiReply for CommitTransactionResponse {
    fn validate(&self) -> Result<(), String> {
        if self.file_id.trim().is_empty() {
            return Err("empty file_id".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadSingleResponse {
    #[serde(alias = "file_id")]
    pub media_id: String,
}

impl ApiReply for UploadSingleResponse {
    fn validate(&self) -> Result<(), String> {
        if self.media_id.trim().is_empty() {
            return Err("empty media_id".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadMediaResponse {
    pub media_id: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl ApiReply for UploadMediaResponse {
    fn validate(&self) -> Result<(), String> {
        if self.media_id.trim().is_empty() {
            return Err("empty media_id".to_string());
        }
        Ok(())
    }
}

/// Registration replies carry nothing beyond the status fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterCallbackResponse {}

impl ApiReply for RegisterCallbackResponse {}

/// One micro app visible to the corporation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microapp {
    pub agent_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub app_desc: Option<String>,
    #[serde(default)]
    pub app_icon: Option<String>,
    #[serde(default)]
    pub homepage_link: Option<String>,
    #[serde(default)]
    pub app_status: Option<i32>,
    #[serde(default)]
    pub is_self: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroappListResponse {
    #[serde(default)]
    pub app_list: Vec<Microapp>,
}

impl ApiReply for MicroappListResponse {}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Decode a reply body into its typed record
pub fn decode_reply<T: ApiReply>(body: &str) -> Result<T, TransportError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| TransportError::Malformed(format!("invalid JSON: {}", e)))?;

    let status: ApiStatus = serde_json::from_value(value.clone())
        .map_err(|e| TransportError::Malformed(format!("invalid status fields: {}", e)))?;

    if status.errcode != 0 {
        return Err(TransportError::Api {
            code: status.errcode,
            message: status.errmsg,
        });
    }

    let reply: T = serde_json::from_value(value)
        .map_err(|e| TransportError::Malformed(e.to_string()))?;
    reply.validate().map_err(TransportError::Malformed)?;

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open_reply() {
        let reply: OpenTransactionResponse =
            decode_reply(r#"{"errcode":0,"errmsg":"ok","upload_id":"UPLOAD1"}"#).unwrap();
        assert_eq!(reply.upload_id, "UPLOAD1");
    }

    #[test]
    fn test_decode_platform_refusal() {
        let result: Result<OpenTransactionResponse, _> =
            decode_reply(r#"{"errcode":40035,"errmsg":"file too small"}"#);

        assert_eq!(
            result,
            Err(TransportError::Api {
                code: 40035,
                message: "file too small".to_string()
            })
        );
    }

    #[test]
    fn test_decode_malformed_bodies() {
        let not_json: Result<UploadChunkResponse, _> = decode_reply("<html>oops</html>");
        assert!(matches!(not_json, Err(TransportError::Malformed(_))));

        let missing: Result<OpenTransactionResponse, _> =
            decode_reply(r#"{"errcode":0,"errmsg":"ok"}"#);
        assert!(matches!(missing, Err(TransportError::Malformed(_))));

        let empty: Result<CommitTransactionResponse, _> =
            decode_reply(r#"{"errcode":0,"file_id":"  "}"#);
        assert!(matches!(empty, Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_handle_field_aliases() {
        let commit: CommitTransactionResponse =
            decode_reply(r#"{"errcode":0,"media_id":"@lA"}"#).unwrap();
        assert_eq!(commit.file_id, "@lA");

        let single: UploadSingleResponse =
            decode_reply(r#"{"errcode":0,"file_id":"@lB"}"#).unwrap();
        assert_eq!(single.media_id, "@lB");
    }

    #[test]
    fn test_decode_media_reply() {
        let reply: UploadMediaResponse = decode_reply(
            r#"{"errcode":0,"errmsg":"ok","type":"image","media_id":"@lAz","created_at":1605863153573}"#,
        )
        .unwrap();

        assert_eq!(reply.media_id, "@lAz");
        assert_eq!(reply.media_type, Some(MediaType::Image));
        assert_eq!(reply.created_at, Some(1605863153573));
    }

    #[test]
    fn test_decode_microapp_list() {
        let reply: MicroappListResponse = decode_reply(
            r#"{"errcode":0,"errmsg":"ok","appList":[{"agentId":1001,"name":"Attendance","appStatus":1,"isSelf":false}]}"#,
        )
        .unwrap();

        assert_eq!(reply.app_list.len(), 1);
        assert_eq!(reply.app_list[0].agent_id, 1001);
        assert_eq!(reply.app_list[0].name, "Attendance");
        assert_eq!(reply.app_list[0].is_self, Some(false));
    }

    #[test]
    fn test_callback_payload_field_names() {
        let request = RegisterCallbackRequest {
            call_back_tag: vec!["user_add_org".to_string()],
            token: "tok".to_string(),
            aes_key: "key".to_string(),
            url: "https://bridge.example.com/api/v1/events".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["call_back_tag"][0], "user_add_org");
        assert_eq!(value["aes_key"], "key");
    }

    #[test]
    fn test_media_type_limits() {
        let request = UploadMediaRequest {
            media_type: MediaType::Voice,
        };
        assert_eq!(request.query(), vec![("type", "voice".to_string())]);
        assert!(MediaType::Image.max_size() < MediaType::File.max_size());
        assert_eq!(MediaType::default(), MediaType::Image);
    }

    #[test]
    fn test_commit_query_repeats_declaration() {
        let request = CommitTransactionRequest {
            agent_id: "42".to_string(),
            upload_id: UploadId::new("tx"),
            file_size: 307200,
            chunk_numbers: 2,
        };

        assert_eq!(
            request.query(),
            vec![
                ("agent_id", "42".to_string()),
                ("file_size", "307200".to_string()),
                ("chunk_numbers", "2".to_string()),
                ("upload_id", "tx".to_string()),
            ]
        );
    }
}
