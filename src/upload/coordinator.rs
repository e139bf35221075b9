//! Upload Session Coordinator
//!
//! Drives one chunked upload through the platform's transaction protocol:
//! 1. Open a transaction declaring file size and chunk count
//! 2. Send every chunk tagged with its sequence, in any order
//! 3. Commit, repeating the declaration, once every chunk is acknowledged
//!
//! Errors on either transaction boundary abort the session. A failed chunk
//! leaves the session open so the same sequence can be sent again.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::transport::{
    CommitTransactionRequest, CspaceTransport, MediaType, OpenTransactionRequest, TransportError,
    UploadChunkRequest, UploadMediaRequest, UploadSingleRequest,
};

use super::planner::plan;
use super::source::{ByteSource, FileSource};
use super::tracker::TransactionTracker;
use super::types::{
    ByteRange, ChunkAck, ChunkPlan, FinalizedHandle, PlannedChunk, SessionState, UploadError,
    UploadId, UploadPolicy, UploadSession, MAX_CHUNKS, MAX_CHUNK_SIZE,
};

// ============================================================================
// Coordinator
// ============================================================================

/// Runs upload transactions against one transport
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    transport: Arc<dyn CspaceTransport>,
    tracker: TransactionTracker,
    policy: UploadPolicy,
}

impl UploadCoordinator {
    /// Create a coordinator with its own empty tracker
    pub fn new(transport: Arc<dyn CspaceTransport>, policy: UploadPolicy) -> Self {
        Self::with_tracker(transport, TransactionTracker::new(), policy)
    }

    /// Create a coordinator around an existing tracker
    pub fn with_tracker(
        transport: Arc<dyn CspaceTransport>,
        tracker: TransactionTracker,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                tracker,
                policy,
            }),
        }
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.inner.tracker
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.inner.policy
    }

    // ========================================================================
    // Protocol Operations
    // ========================================================================

    /// Open a transaction for `plan` and start tracking it
    pub async fn open(&self, agent_id: &str, plan: &ChunkPlan) -> Result<UploadId, UploadError> {
        validate_plan(plan)?;

        let request = OpenTransactionRequest {
            agent_id: agent_id.to_string(),
            file_size: plan.file_size,
            chunk_numbers: plan.chunk_count(),
        };

        let response = self
            .inner
            .transport
            .open_transaction(&request)
            .await
            .map_err(|e| {
                tracing::warn!(
                    agent_id = %agent_id,
                    file_size = plan.file_size,
                    chunks = plan.chunk_count(),
                    error = %e,
                    "Open transaction failed"
                );
                match e {
                    TransportError::Malformed(msg) => UploadError::MalformedResponse(msg),
                    other => UploadError::TransactionRejected(other.to_string()),
                }
            })?;

        let upload_id = UploadId::new(response.upload_id);
        if let Err(e) = self
            .inner
            .tracker
            .create(UploadSession::new(upload_id.clone(), agent_id, plan))
            .await
        {
            self.notify_abort(agent_id, &upload_id).await;
            return Err(e);
        }

        Ok(upload_id)
    }

    /// Send one chunk and record its ack
    ///
    /// Re-sending an acknowledged sequence is answered locally with
    /// `duplicate = true`. If the session is aborted while the chunk is in
    /// flight, the late ack is dropped and `SessionClosed` is returned.
    pub async fn upload_chunk(
        &self,
        upload_id: &UploadId,
        sequence: u32,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck, UploadError> {
        let handle = self.inner.tracker.session(upload_id).await?;

        let agent_id = {
            let mut session = handle.lock().await;
            ensure_open(&session)?;

            let total_chunks = session.chunk_count;
            let record = session
                .record(sequence)
                .ok_or(UploadError::SequenceOutOfRange {
                    sequence,
                    max: total_chunks,
                })?;

            let actual = bytes.len() as u64;
            if actual != record.range.length {
                return Err(UploadError::ChunkLengthMismatch {
                    sequence,
                    expected: record.range.length,
                    actual,
                });
            }

            if record.acked {
                tracing::debug!(upload_id = %upload_id, sequence = sequence, "Chunk already acknowledged");
                return Ok(ChunkAck {
                    upload_id: upload_id.clone(),
                    sequence,
                    duplicate: true,
                    acked_chunks: session.acked_count(),
                    total_chunks,
                    complete: session.is_complete(),
                });
            }

            if session.state == SessionState::Opened {
                session.state = SessionState::Uploading;
            }
            session.agent_id.clone()
        };

        let request = UploadChunkRequest {
            agent_id,
            upload_id: upload_id.clone(),
            chunk_sequence: sequence,
        };

        self.inner
            .transport
            .upload_chunk(&request, bytes)
            .await
            .map_err(|e| {
                tracing::warn!(upload_id = %upload_id, sequence = sequence, error = %e, "Chunk upload failed");
                match e {
                    TransportError::Malformed(msg) => UploadError::MalformedResponse(msg),
                    other => UploadError::ChunkUpload {
                        sequence,
                        reason: other.to_string(),
                    },
                }
            })?;

        let outcome = self
            .inner
            .tracker
            .mark_chunk_acked(upload_id, sequence)
            .await
            .inspect_err(|e| {
                if matches!(e, UploadError::SessionClosed { .. } | UploadError::SessionNotFound(_)) {
                    tracing::debug!(upload_id = %upload_id, sequence = sequence, "Discarding late chunk ack");
                }
            })?;

        tracing::debug!(
            upload_id = %upload_id,
            sequence = sequence,
            acked = outcome.acked_chunks,
            total = outcome.total_chunks,
            "Chunk acknowledged"
        );

        Ok(ChunkAck {
            upload_id: upload_id.clone(),
            sequence,
            duplicate: outcome.duplicate,
            acked_chunks: outcome.acked_chunks,
            total_chunks: outcome.total_chunks,
            complete: outcome.acked_chunks == outcome.total_chunks,
        })
    }

    /// Commit a fully acknowledged transaction
    ///
    /// Holds the session lock across the remote call so no other transition
    /// can interleave with the commit.
    pub async fn commit(&self, upload_id: &UploadId) -> Result<FinalizedHandle, UploadError> {
        let handle = self.inner.tracker.session(upload_id).await?;
        let mut session = handle.lock().await;

        ensure_open(&session)?;
        if session.state != SessionState::AllChunksAcked || !session.is_complete() {
            return Err(UploadError::IncompleteUpload {
                missing: session.missing_sequences(),
            });
        }

        let request = CommitTransactionRequest {
            agent_id: session.agent_id.clone(),
            upload_id: upload_id.clone(),
            file_size: session.total_file_size,
            chunk_numbers: session.chunk_count,
        };

        match self.inner.transport.commit_transaction(&request).await {
            Ok(response) => {
                session.state = SessionState::Committed;
                tracing::info!(
                    upload_id = %upload_id,
                    file_size = session.total_file_size,
                    chunks = session.chunk_count,
                    handle = %response.file_id,
                    "Upload transaction committed"
                );
                Ok(FinalizedHandle::new(response.file_id))
            }
            Err(e) => {
                session.state = SessionState::Aborted;
                let agent_id = session.agent_id.clone();
                drop(session);

                tracing::warn!(upload_id = %upload_id, error = %e, "Commit failed, session aborted");
                self.notify_abort(&agent_id, upload_id).await;

                Err(match e {
                    TransportError::Malformed(msg) => UploadError::MalformedResponse(msg),
                    other => UploadError::CommitRejected(other.to_string()),
                })
            }
        }
    }

    /// Abandon a session
    ///
    /// A no-op once the session is committed or aborted.
    pub async fn abort(&self, upload_id: &UploadId) -> Result<(), UploadError> {
        let handle = self.inner.tracker.session(upload_id).await?;

        let agent_id = {
            let mut session = handle.lock().await;
            if session.state.is_terminal() {
                return Ok(());
            }
            session.state = SessionState::Aborted;
            tracing::info!(
                upload_id = %upload_id,
                acked = session.acked_count(),
                total = session.chunk_count,
                "Upload session aborted"
            );
            session.agent_id.clone()
        };

        self.notify_abort(&agent_id, upload_id).await;
        Ok(())
    }

    async fn notify_abort(&self, agent_id: &str, upload_id: &UploadId) {
        if let Err(e) = self
            .inner
            .transport
            .abort_transaction(agent_id, upload_id)
            .await
        {
            tracing::warn!(upload_id = %upload_id, error = %e, "Failed to notify platform of abort");
        }
    }

    // ========================================================================
    // Entry Points
    // ========================================================================

    /// Upload a file through a chunked transaction
    pub async fn upload_file_in_chunks(
        &self,
        path: impl AsRef<Path>,
        agent_id: &str,
    ) -> Result<FinalizedHandle, UploadError> {
        let source = FileSource::open(path).await?;
        self.upload_source(&source, agent_id).await
    }

    /// Upload a file, choosing the single-request path for small files
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        agent_id: &str,
    ) -> Result<FinalizedHandle, UploadError> {
        let source = FileSource::open(path).await?;
        if source.size() < self.inner.policy.chunk.min_chunk_size {
            self.upload_single_source(&source, agent_id).await
        } else {
            self.upload_source(&source, agent_id).await
        }
    }

    /// Plan, open, send every chunk and commit
    ///
    /// Returns the finalized handle or the single error that ended the
    /// upload; the session is aborted on failure and never left tracked.
    pub async fn upload_source<S>(
        &self,
        source: &S,
        agent_id: &str,
    ) -> Result<FinalizedHandle, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let plan = plan(source.size(), &self.inner.policy.chunk)?;
        let upload_id = self.open(agent_id, &plan).await?;

        let result = self.transfer_and_commit(source, &upload_id, &plan).await;

        if let Err(e) = &result {
            tracing::warn!(upload_id = %upload_id, error = %e, "Chunked upload failed");
            if let Err(abort_err) = self.abort(&upload_id).await {
                tracing::warn!(upload_id = %upload_id, error = %abort_err, "Abort after failure failed");
            }
        }

        self.inner.tracker.remove(&upload_id).await;
        result
    }

    async fn transfer_and_commit<S>(
        &self,
        source: &S,
        upload_id: &UploadId,
        plan: &ChunkPlan,
    ) -> Result<FinalizedHandle, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let parallelism = self.inner.policy.parallelism.max(1);

        let _acks: Vec<ChunkAck> = stream::iter(plan.chunks.iter().copied())
            .map(move |chunk| self.send_chunk_with_retry(source, upload_id, chunk))
            .buffer_unordered(parallelism)
            .try_collect()
            .await?;

        self.commit(upload_id).await
    }

    async fn send_chunk_with_retry<S>(
        &self,
        source: &S,
        upload_id: &UploadId,
        chunk: PlannedChunk,
    ) -> Result<ChunkAck, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let max_attempts = self.inner.policy.max_chunk_attempts.max(1);
        let mut attempt = 1;

        loop {
            let bytes = source.read_range(chunk.range).await?;
            match self.upload_chunk(upload_id, chunk.sequence, bytes).await {
                Err(UploadError::ChunkUpload { sequence, reason }) if attempt < max_attempts => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        sequence = sequence,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        reason = %reason,
                        "Retrying chunk upload"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Upload a small file in one request
    pub async fn upload_single(
        &self,
        path: impl AsRef<Path>,
        agent_id: &str,
    ) -> Result<FinalizedHandle, UploadError> {
        let source = FileSource::open(path).await?;
        self.upload_single_source(&source, agent_id).await
    }

    /// Single-request upload of a whole source
    pub async fn upload_single_source<S>(
        &self,
        source: &S,
        agent_id: &str,
    ) -> Result<FinalizedHandle, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let size = source.size();
        let max = self.inner.policy.single_upload_max_size;

        if size == 0 {
            return Err(UploadError::InvalidSize {
                size,
                reason: "empty file".to_string(),
            });
        }
        if size > max {
            return Err(UploadError::InvalidSize {
                size,
                reason: format!("above the {} byte single upload limit, use the chunked upload", max),
            });
        }

        let bytes = source.read_range(ByteRange::new(0, size)).await?;
        let request = UploadSingleRequest {
            agent_id: agent_id.to_string(),
            file_size: size,
        };

        let response = self
            .inner
            .transport
            .upload_single(&request, source.file_name(), bytes)
            .await
            .map_err(|e| match e {
                TransportError::Malformed(msg) => UploadError::MalformedResponse(msg),
                other => UploadError::TransactionRejected(other.to_string()),
            })?;

        tracing::info!(
            agent_id = %agent_id,
            file_name = %source.file_name(),
            file_size = size,
            handle = %response.media_id,
            "Single upload complete"
        );

        Ok(FinalizedHandle::new(response.media_id))
    }

    /// Upload a file as a message media attachment
    pub async fn upload_media(
        &self,
        path: impl AsRef<Path>,
        media_type: MediaType,
    ) -> Result<FinalizedHandle, UploadError> {
        let source = FileSource::open(path).await?;
        self.upload_media_source(&source, media_type).await
    }

    pub async fn upload_media_source<S>(
        &self,
        source: &S,
        media_type: MediaType,
    ) -> Result<FinalizedHandle, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let size = source.size();
        let max = media_type.max_size();

        if size == 0 {
            return Err(UploadError::InvalidSize {
                size,
                reason: "empty file".to_string(),
            });
        }
        if size > max {
            return Err(UploadError::InvalidSize {
                size,
                reason: format!("above the {} byte limit for {} media", max, media_type),
            });
        }

        let bytes = source.read_range(ByteRange::new(0, size)).await?;
        let request = UploadMediaRequest { media_type };

        let response = self
            .inner
            .transport
            .upload_media(&request, source.file_name(), bytes)
            .await
            .map_err(|e| match e {
                TransportError::Malformed(msg) => UploadError::MalformedResponse(msg),
                other => UploadError::TransactionRejected(other.to_string()),
            })?;

        tracing::info!(
            file_name = %source.file_name(),
            media_type = %media_type,
            file_size = size,
            handle = %response.media_id,
            "Media upload complete"
        );

        Ok(FinalizedHandle::new(response.media_id))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_open(session: &UploadSession) -> Result<(), UploadError> {
    if session.state.is_terminal() {
        return Err(UploadError::SessionClosed {
            upload_id: session.upload_id.to_string(),
            state: session.state,
        });
    }
    Ok(())
}

/// Check a plan before it is declared to the platform
fn validate_plan(plan: &ChunkPlan) -> Result<(), UploadError> {
    let count = plan.chunks.len();
    if count == 0 {
        return Err(UploadError::InvalidSize {
            size: plan.file_size,
            reason: "plan has no chunks".to_string(),
        });
    }
    if count > MAX_CHUNKS as usize {
        return Err(UploadError::TooManyChunks {
            required: count as u64,
            max: MAX_CHUNKS,
        });
    }

    let mut offset = 0;
    for (i, chunk) in plan.chunks.iter().enumerate() {
        if chunk.sequence as usize != i + 1
            || chunk.range.offset != offset
            || chunk.range.length == 0
            || chunk.range.length > MAX_CHUNK_SIZE
        {
            return Err(UploadError::InvalidSize {
                size: plan.file_size,
                reason: format!("chunk {} does not continue the partition", chunk.sequence),
            });
        }
        offset = chunk.range.end();
    }

    if offset != plan.file_size {
        return Err(UploadError::InvalidSize {
            size: plan.file_size,
            reason: format!("chunks cover {} bytes", offset),
        });
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
