//! Scripted transport for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::upload::UploadId;

use super::client::{CspaceTransport, PlatformTransport};
use super::types::{
    CommitTransactionRequest, CommitTransactionResponse, MediaType, Microapp,
    MicroappListResponse, OpenTransactionRequest, OpenTransactionResponse,
    RegisterCallbackRequest, RegisterCallbackResponse, TransportError, UploadChunkRequest,
    UploadChunkResponse, UploadMediaRequest, UploadMediaResponse, UploadSingleRequest,
    UploadSingleResponse,
};

/// Pauses one chunk upload until the test releases it
#[derive(Clone, Default)]
pub struct ChunkGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Mock transport that counts calls and fails on request
#[derive(Default)]
pub struct MockTransport {
    pub open_calls: AtomicUsize,
    pub chunk_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub media_calls: AtomicUsize,

    open_error: Mutex<Option<TransportError>>,
    commit_error: Mutex<Option<TransportError>>,
    single_error: Mutex<Option<TransportError>>,
    media_error: Mutex<Option<TransportError>>,
    callback_error: Mutex<Option<TransportError>>,
    fixed_upload_id: Mutex<Option<String>>,

    /// sequence -> remaining failures
    chunk_failures: Mutex<HashMap<u32, u32>>,
    chunk_gates: Mutex<HashMap<u32, ChunkGate>>,

    /// (upload id, sequence) -> bytes received
    received: Mutex<HashMap<(String, u32), Vec<u8>>>,
    commits: Mutex<Vec<CommitTransactionRequest>>,
    media_types: Mutex<Vec<MediaType>>,
    callbacks: Mutex<Vec<RegisterCallbackRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(self, error: TransportError) -> Self {
        *self.open_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_commit(self, error: TransportError) -> Self {
        *self.commit_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_single(self, error: TransportError) -> Self {
        *self.single_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_media(self, error: TransportError) -> Self {
        *self.media_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_callback(self, error: TransportError) -> Self {
        *self.callback_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_upload_id(self, id: &str) -> Self {
        *self.fixed_upload_id.lock().unwrap() = Some(id.to_string());
        self
    }

    /// Fail the next `times` uploads of `sequence`
    pub fn fail_chunk(self, sequence: u32, times: u32) -> Self {
        self.chunk_failures.lock().unwrap().insert(sequence, times);
        self
    }

    /// Hold uploads of `sequence` until the returned gate is released
    pub fn gate_chunk(&self, sequence: u32) -> ChunkGate {
        let gate = ChunkGate::default();
        self.chunk_gates.lock().unwrap().insert(sequence, gate.clone());
        gate
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn received(&self, upload_id: &str, sequence: u32) -> Option<Vec<u8>> {
        self.received
            .lock()
            .unwrap()
            .get(&(upload_id.to_string(), sequence))
            .cloned()
    }

    pub fn commits(&self) -> Vec<CommitTransactionRequest> {
        self.commits.lock().unwrap().clone()
    }

    pub fn media_types(&self) -> Vec<MediaType> {
        self.media_types.lock().unwrap().clone()
    }

    pub fn callbacks(&self) -> Vec<RegisterCallbackRequest> {
        self.callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl CspaceTransport for MockTransport {
    async fn open_transaction(
        &self,
        _request: &OpenTransactionRequest,
    ) -> Result<OpenTransactionResponse, TransportError> {
        let n = self.open_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.open_error.lock().unwrap().clone() {
            return Err(error);
        }

        let upload_id = self
            .fixed_upload_id
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("upload-{}", n));
        Ok(OpenTransactionResponse { upload_id })
    }

    async fn upload_chunk(
        &self,
        request: &UploadChunkRequest,
        payload: Vec<u8>,
    ) -> Result<UploadChunkResponse, TransportError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self
            .chunk_gates
            .lock()
            .unwrap()
            .get(&request.chunk_sequence)
            .cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        {
            let mut failures = self.chunk_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&request.chunk_sequence) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Request("connection reset".to_string()));
                }
            }
        }

        self.received.lock().unwrap().insert(
            (request.upload_id.to_string(), request.chunk_sequence),
            payload,
        );
        Ok(UploadChunkResponse {})
    }

    async fn commit_transaction(
        &self,
        request: &CommitTransactionRequest,
    ) -> Result<CommitTransactionResponse, TransportError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.commits.lock().unwrap().push(request.clone());

        if let Some(error) = self.commit_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(CommitTransactionResponse {
            file_id: format!("file-{}", request.upload_id),
        })
    }

    async fn abort_transaction(
        &self,
        _agent_id: &str,
        _upload_id: &UploadId,
    ) -> Result<(), TransportError> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_single(
        &self,
        _request: &UploadSingleRequest,
        file_name: &str,
        _payload: Vec<u8>,
    ) -> Result<UploadSingleResponse, TransportError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.single_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(UploadSingleResponse {
            media_id: format!("media-{}", file_name),
        })
    }

    async fn upload_media(
        &self,
        request: &UploadMediaRequest,
        file_name: &str,
        _payload: Vec<u8>,
    ) -> Result<UploadMediaResponse, TransportError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.media_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.media_types.lock().unwrap().push(request.media_type);
        Ok(UploadMediaResponse {
            media_id: format!("{}-{}", request.media_type, file_name),
            media_type: Some(request.media_type),
            created_at: Some(1_600_000_000_000),
        })
    }
}

#[async_trait]
impl PlatformTransport for MockTransport {
    async fn register_callback(
        &self,
        request: &RegisterCallbackRequest,
    ) -> Result<RegisterCallbackResponse, TransportError> {
        if let Some(error) = self.callback_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.callbacks.lock().unwrap().push(request.clone());
        Ok(RegisterCallbackResponse {})
    }

    async fn list_microapps(&self) -> Result<MicroappListResponse, TransportError> {
        Ok(MicroappListResponse {
            app_list: vec![Microapp {
                agent_id: 1001,
                name: "Attendance".to_string(),
                app_desc: None,
                app_icon: None,
                homepage_link: None,
                app_status: Some(1),
                is_self: Some(false),
            }],
        })
    }
}
