//! Transaction State Tracker
//!
//! Keeps every in-flight upload session of one coordinator:
//! - Sessions indexed by remote upload ID behind a map-level `RwLock`
//! - One `Mutex` per session so state changes on a session are serialized
//!   while different sessions never contend

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::types::{SessionState, UploadError, UploadId, UploadSession};

/// Shared, individually locked session
pub type SessionHandle = Arc<Mutex<UploadSession>>;

/// Outcome of recording a chunk acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// The sequence was already acknowledged
    pub duplicate: bool,

    /// This ack moved the session to `AllChunksAcked`
    pub completed_now: bool,

    pub acked_chunks: u32,
    pub total_chunks: u32,
}

// ============================================================================
// Tracker
// ============================================================================

/// In-memory registry of upload sessions
#[derive(Clone, Default)]
pub struct TransactionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    sessions: RwLock<HashMap<UploadId, SessionHandle>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened session
    pub async fn create(&self, session: UploadSession) -> Result<SessionHandle, UploadError> {
        let id = session.upload_id.clone();
        let mut sessions = self.inner.sessions.write().await;

        if sessions.contains_key(&id) {
            return Err(UploadError::TransactionRejected(format!(
                "upload id {} is already in flight",
                id
            )));
        }

        tracing::info!(
            upload_id = %id,
            agent_id = %session.agent_id,
            file_size = session.total_file_size,
            chunks = session.chunk_count,
            "Created upload session"
        );

        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    /// Get the lockable session handle
    pub async fn session(&self, id: &UploadId) -> Result<SessionHandle, UploadError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(id.to_string()))
    }

    /// Snapshot of a session
    pub async fn get(&self, id: &UploadId) -> Result<UploadSession, UploadError> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Record the platform's ack for `sequence`
    ///
    /// The record update and the completeness check happen under the same
    /// session lock, so exactly one call observes `completed_now`.
    pub async fn mark_chunk_acked(
        &self,
        id: &UploadId,
        sequence: u32,
    ) -> Result<AckOutcome, UploadError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;

        if session.state.is_terminal() {
            return Err(UploadError::SessionClosed {
                upload_id: id.to_string(),
                state: session.state,
            });
        }

        let total_chunks = session.chunk_count;
        let record = session
            .record_mut(sequence)
            .ok_or(UploadError::SequenceOutOfRange {
                sequence,
                max: total_chunks,
            })?;

        let duplicate = record.acked;
        record.acked = true;

        if session.state == SessionState::Opened {
            session.state = SessionState::Uploading;
        }

        let mut completed_now = false;
        if session.state == SessionState::Uploading && session.is_complete() {
            session.state = SessionState::AllChunksAcked;
            completed_now = true;
            tracing::info!(upload_id = %id, chunks = total_chunks, "All chunks acknowledged");
        }

        Ok(AckOutcome {
            duplicate,
            completed_now,
            acked_chunks: session.acked_count(),
            total_chunks,
        })
    }

    /// Check if every chunk of a session is acknowledged
    pub async fn is_complete(&self, id: &UploadId) -> Result<bool, UploadError> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.is_complete())
    }

    /// Drop a session, returning its last state
    pub async fn remove(&self, id: &UploadId) -> Option<UploadSession> {
        let handle = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.remove(id)?
        };
        let session = handle.lock().await;
        Some(session.clone())
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    /// Count sessions that have not reached a terminal state
    pub async fn active_count(&self) -> usize {
        let handles: Vec<SessionHandle> = {
            let sessions = self.inner.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut count = 0;
        for handle in handles {
            if !handle.lock().await.state.is_terminal() {
                count += 1;
            }
        }
        count
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Remove committed and aborted sessions
    ///
    /// Returns the number of sessions removed
    pub async fn purge_finished(&self) -> usize {
        let handles: Vec<(UploadId, SessionHandle)> = {
            let sessions = self.inner.sessions.read().await;
            sessions
                .iter()
                .map(|(id, handle)| (id.clone(), handle.clone()))
                .collect()
        };

        let mut finished = Vec::new();
        for (id, handle) in handles {
            if handle.lock().await.state.is_terminal() {
                finished.push(id);
            }
        }

        let count = {
            let mut sessions = self.inner.sessions.write().await;
            finished
                .iter()
                .filter(|id| sessions.remove(*id).is_some())
                .count()
        };

        if count > 0 {
            tracing::debug!(count = count, "Purged finished upload sessions");
        }

        count
    }
}

// ============================================================================
// Tests
// ============================================================================
