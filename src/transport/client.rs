//! Transport clients
//!
//! Defines the transport traits the coordinator and routes talk to and the
//! reqwest implementation for the DingTalk open API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::config::DingTalkConfig;
use crate::upload::UploadId;

use super::types::{
    decode_reply, ApiReply, CommitTransactionRequest, CommitTransactionResponse,
    MicroappListResponse, OpenTransactionRequest, OpenTransactionResponse,
    RegisterCallbackRequest, RegisterCallbackResponse, TransportError, UploadChunkRequest,
    UploadChunkResponse, UploadMediaRequest, UploadMediaResponse, UploadSingleRequest,
    UploadSingleResponse,
};

const TRANSACTION_PATH: &str = "/file/upload/transaction";
const CHUNK_PATH: &str = "/file/upload/chunk";
const SINGLE_PATH: &str = "/file/upload/single";
const MEDIA_PATH: &str = "/media/upload";
const REGISTER_CALLBACK_PATH: &str = "/call_back/register_call_back";
const MICROAPP_LIST_PATH: &str = "/microapp/list";

/// Remote upload operations
#[async_trait]
pub trait CspaceTransport: Send + Sync {
    /// Negotiate a new chunked transaction
    async fn open_transaction(
        &self,
        request: &OpenTransactionRequest,
    ) -> Result<OpenTransactionResponse, TransportError>;

    /// Send one chunk's raw bytes
    async fn upload_chunk(
        &self,
        request: &UploadChunkRequest,
        payload: Vec<u8>,
    ) -> Result<UploadChunkResponse, TransportError>;

    /// Finalize a transaction into an artifact
    async fn commit_transaction(
        &self,
        request: &CommitTransactionRequest,
    ) -> Result<CommitTransactionResponse, TransportError>;

    /// Tell the platform a transaction is abandoned
    ///
    /// The open API has no abort call, so the default does nothing and the
    /// transaction simply lapses on the platform side.
    async fn abort_transaction(
        &self,
        _agent_id: &str,
        _upload_id: &UploadId,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Upload a small file in one request
    async fn upload_single(
        &self,
        request: &UploadSingleRequest,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<UploadSingleResponse, TransportError>;

    /// Upload a message media file
    async fn upload_media(
        &self,
        request: &UploadMediaRequest,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<UploadMediaResponse, TransportError>;
}

/// Corporation-level calls outside the upload protocol
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    async fn register_callback(
        &self,
        request: &RegisterCallbackRequest,
    ) -> Result<RegisterCallbackResponse, TransportError>;

    async fn list_microapps(&self) -> Result<MicroappListResponse, TransportError>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// reqwest client for the DingTalk open API
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpTransport {
    pub fn new(config: &DingTalkConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_token(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        query.insert(0, ("access_token", self.access_token.clone()));
        query
    }

    async fn send<T: ApiReply>(&self, request: reqwest::RequestBuilder) -> Result<T, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_reply(&body)
    }

    fn file_form(
        field: &'static str,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<Form, TransportError> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = Part::bytes(payload)
            .file_name(file_name.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| TransportError::Request(format!("invalid content type: {}", e)))?;
        Ok(Form::new().part(field, part))
    }
}

#[async_trait]
impl CspaceTransport for HttpTransport {
    async fn open_transaction(
        &self,
        request: &OpenTransactionRequest,
    ) -> Result<OpenTransactionResponse, TransportError> {
        let query = self.with_token(request.query());
        self.send(self.http.get(self.url(TRANSACTION_PATH)).query(&query))
            .await
    }

    async fn upload_chunk(
        &self,
        request: &UploadChunkRequest,
        payload: Vec<u8>,
    ) -> Result<UploadChunkResponse, TransportError> {
        let query = self.with_token(request.query());
        let form = Self::file_form("file", &format!("chunk-{}", request.chunk_sequence), payload)?;
        self.send(
            self.http
                .post(self.url(CHUNK_PATH))
                .query(&query)
                .multipart(form),
        )
        .await
    }

    async fn commit_transaction(
        &self,
        request: &CommitTransactionRequest,
    ) -> Result<CommitTransactionResponse, TransportError> {
        let query = self.with_token(request.query());
        self.send(self.http.get(self.url(TRANSACTION_PATH)).query(&query))
            .await
    }

    async fn upload_single(
        &self,
        request: &UploadSingleRequest,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<UploadSingleResponse, TransportError> {
        let query = self.with_token(request.query());
        let form = Self::file_form("file", file_name, payload)?;
        self.send(
            self.http
                .post(self.url(SINGLE_PATH))
                .query(&query)
                .multipart(form),
        )
        .await
    }

    async fn upload_media(
        &self,
        request: &UploadMediaRequest,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<UploadMediaResponse, TransportError> {
        let query = self.with_token(request.query());
        let form = Self::file_form("media", file_name, payload)?;
        self.send(
            self.http
                .post(self.url(MEDIA_PATH))
                .query(&query)
                .multipart(form),
        )
        .await
    }
}

#[async_trait]
impl PlatformTransport for HttpTransport {
    async fn register_callback(
        &self,
        request: &RegisterCallbackRequest,
    ) -> Result<RegisterCallbackResponse, TransportError> {
        let query = self.with_token(Vec::new());
        self.send(
            self.http
                .post(self.url(REGISTER_CALLBACK_PATH))
                .query(&query)
                .json(request),
        )
        .await
    }

    async fn list_microapps(&self) -> Result<MicroappListResponse, TransportError> {
        let query = self.with_token(Vec::new());
        self.send(
            self.http
                .post(self.url(MICROAPP_LIST_PATH))
                .query(&query)
                .json(&serde_json::json!({})),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> DingTalkConfig {
        DingTalkConfig {
            api_base_url: base.to_string(),
            agent_id: "1000".to_string(),
            access_token: "token-abc".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let transport = HttpTransport::new(&config("https://oapi.example.com/")).unwrap();
        assert_eq!(
            transport.url(CHUNK_PATH),
            "https://oapi.example.com/file/upload/chunk"
        );
    }

    #[test]
    fn test_token_leads_query() {
        let transport = HttpTransport::new(&config("https://oapi.example.com")).unwrap();
        let request = UploadSingleRequest {
            agent_id: "1000".to_string(),
            file_size: 12,
        };

        let query = transport.with_token(request.query());
        assert_eq!(query[0], ("access_token", "token-abc".to_string()));
        assert_eq!(query.len(), 3);
    }

    #[test]
    fn test_file_form_builds_for_unknown_extension() {
        assert!(HttpTransport::file_form("file", "chunk-1", vec![0u8; 16]).is_ok());
        assert!(HttpTransport::file_form("media", "qr.png", vec![0u8; 16]).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let transport = HttpTransport::new(&config("http://127.0.0.1:9")).unwrap();
        let request = OpenTransactionRequest {
            agent_id: "1000".to_string(),
            file_size: 300 * 1024,
            chunk_numbers: 2,
        };

        let result = transport.open_transaction(&request).await;
        assert!(matches!(result, Err(TransportError::Request(_))));

        let result = transport.list_microapps().await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
