//! Upload types for the cspace chunked transaction protocol

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Smallest file the chunked path accepts: 100KiB
pub const MIN_CHUNK_SIZE: u64 = 100 * 1024;

/// Hard ceiling for a single chunk: 8MiB
pub const MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Hard ceiling for the number of chunks in one transaction
pub const MAX_CHUNKS: u32 = 10_000;

/// Largest file sent through the single-request path: 8MiB
pub const DEFAULT_SINGLE_UPLOAD_MAX_SIZE: u64 = 8 * 1024 * 1024;

/// Chunks in flight at once for one upload
pub const DEFAULT_PARALLELISM: usize = 4;

/// Attempts per chunk made by the file entry point before giving up
pub const DEFAULT_MAX_CHUNK_ATTEMPTS: u32 = 3;

// ============================================================================
// Identifiers
// ============================================================================

/// Remote-assigned transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a finished artifact, as returned by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalizedHandle(String);

impl FinalizedHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FinalizedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Planning Types
// ============================================================================

/// Half-open byte range `[offset, offset + length)` within the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// One planned chunk with its explicit 1-based sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChunk {
    pub sequence: u32,
    pub range: ByteRange,
}

/// Output of the chunk planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Total file size in bytes
    pub file_size: u64,

    /// Size of every chunk except possibly the last
    pub chunk_size: u64,

    /// Chunks in sequence order
    pub chunks: Vec<PlannedChunk>,
}

impl ChunkPlan {
    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Sum of all chunk lengths
    pub fn covered_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.range.length).sum()
    }
}

/// Size and count limits applied by the chunk planner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Files below this size must use the single-file path
    pub min_chunk_size: u64,

    /// Preferred chunk size; never above [`MAX_CHUNK_SIZE`]
    pub max_chunk_size: u64,

    /// Chunk count ceiling; never above [`MAX_CHUNKS`]
    pub max_chunks: u32,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            max_chunks: MAX_CHUNKS,
        }
    }
}

/// Everything the coordinator's entry points need to drive an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub chunk: ChunkPolicy,

    /// Largest file accepted by the single-request path
    pub single_upload_max_size: u64,

    /// Chunks in flight at once
    pub parallelism: usize,

    /// Attempts per chunk (1 = no retry)
    pub max_chunk_attempts: u32,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            chunk: ChunkPolicy::default(),
            single_upload_max_size: DEFAULT_SINGLE_UPLOAD_MAX_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            max_chunk_attempts: DEFAULT_MAX_CHUNK_ATTEMPTS,
        }
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Per-chunk completion record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// 1-based position in the file
    pub sequence: u32,

    /// Bytes of the source file carried by this chunk
    pub range: ByteRange,

    /// Set once the platform confirmed this sequence
    pub acked: bool,
}

/// Upload session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transaction opened, nothing sent yet
    Opened,
    /// At least one chunk dispatched
    Uploading,
    /// Every chunk acknowledged, ready to commit
    AllChunksAcked,
    /// Transaction committed on the platform
    Committed,
    /// Session abandoned
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// In-flight chunked upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Transaction ID assigned by the platform
    pub upload_id: UploadId,

    /// Agent the transaction belongs to
    pub agent_id: String,

    /// Declared file size
    pub total_file_size: u64,

    /// Declared chunk count
    pub chunk_count: u32,

    /// One record per sequence, index = sequence - 1
    pub chunks: Vec<ChunkRecord>,

    /// Current state
    pub state: SessionState,

    /// When the transaction was opened
    pub opened_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a session for an opened transaction
    pub fn new(upload_id: UploadId, agent_id: impl Into<String>, plan: &ChunkPlan) -> Self {
        Self {
            upload_id,
            agent_id: agent_id.into(),
            total_file_size: plan.file_size,
            chunk_count: plan.chunk_count(),
            chunks: plan
                .chunks
                .iter()
                .map(|c| ChunkRecord {
                    sequence: c.sequence,
                    range: c.range,
                    acked: false,
                })
                .collect(),
            state: SessionState::Opened,
            opened_at: Utc::now(),
        }
    }

    /// Look up the record for a 1-based sequence
    pub fn record(&self, sequence: u32) -> Option<&ChunkRecord> {
        if sequence == 0 {
            return None;
        }
        self.chunks.get(sequence as usize - 1)
    }

    pub fn record_mut(&mut self, sequence: u32) -> Option<&mut ChunkRecord> {
        if sequence == 0 {
            return None;
        }
        self.chunks.get_mut(sequence as usize - 1)
    }

    pub fn acked_count(&self) -> u32 {
        self.chunks.iter().filter(|c| c.acked).count() as u32
    }

    /// Check if every chunk has been acknowledged
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.acked)
    }

    /// Sequences still waiting for an ack
    pub fn missing_sequences(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| !c.acked)
            .map(|c| c.sequence)
            .collect()
    }

    /// Calculate progress percentage
    pub fn progress(&self) -> f64 {
        if self.chunks.is_empty() {
            return 100.0;
        }
        (self.acked_count() as f64 / self.chunks.len() as f64) * 100.0
    }
}

/// Result of a successful `upload_chunk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub upload_id: UploadId,
    pub sequence: u32,

    /// The sequence had already been acknowledged before this call
    pub duplicate: bool,

    pub acked_chunks: u32,
    pub total_chunks: u32,

    /// Every chunk of the session is acknowledged
    pub complete: bool,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid size: {size} bytes ({reason})")]
    InvalidSize { size: u64, reason: String },

    #[error("Too many chunks: {required} required (max: {max})")]
    TooManyChunks { required: u64, max: u32 },

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Chunk {sequence} upload failed: {reason}")]
    ChunkUpload { sequence: u32, reason: String },

    #[error("Upload incomplete, missing chunks: {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {upload_id} no longer accepts changes (state: {state:?})")]
    SessionClosed { upload_id: String, state: SessionState },

    #[error("Chunk sequence out of range: {sequence} (max: {max})")]
    SequenceOutOfRange { sequence: u32, max: u32 },

    #[error("Chunk {sequence} length mismatch: expected {expected}, got {actual}")]
    ChunkLengthMismatch { sequence: u32, expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidSize { .. } => StatusCode::BAD_REQUEST,
            Self::TooManyChunks { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TransactionRejected(_) => StatusCode::BAD_GATEWAY,
            Self::ChunkUpload { .. } => StatusCode::BAD_GATEWAY,
            Self::IncompleteUpload { .. } => StatusCode::CONFLICT,
            Self::CommitRejected(_) => StatusCode::BAD_GATEWAY,
            Self::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionClosed { .. } => StatusCode::CONFLICT,
            Self::SequenceOutOfRange { .. } => StatusCode::BAD_REQUEST,
            Self::ChunkLengthMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSize { .. } => "INVALID_SIZE",
            Self::TooManyChunks { .. } => "TOO_MANY_CHUNKS",
            Self::TransactionRejected(_) => "TRANSACTION_REJECTED",
            Self::ChunkUpload { .. } => "CHUNK_UPLOAD_FAILED",
            Self::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
            Self::CommitRejected(_) => "COMMIT_REJECTED",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionClosed { .. } => "SESSION_CLOSED",
            Self::SequenceOutOfRange { .. } => "SEQUENCE_OUT_OF_RANGE",
            Self::ChunkLengthMismatch { .. } => "CHUNK_LENGTH_MISMATCH",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
