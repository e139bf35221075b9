//! Chunk Planner
//!
//! Splits a file into the contiguous byte ranges sent as transaction chunks.
//! Pure and deterministic: no I/O happens here.

use super::types::{
    ByteRange, ChunkPlan, ChunkPolicy, PlannedChunk, UploadError, MAX_CHUNKS, MAX_CHUNK_SIZE,
};

/// Plan the chunks for a file of `file_size` bytes
///
/// The chunk count is the minimal `ceil(file_size / max_chunk_size)`. Chunks
/// never exceed `max_chunk_size`, so a file that would need more than
/// `max_chunks` of them cannot be sent as one transaction.
pub fn plan(file_size: u64, policy: &ChunkPolicy) -> Result<ChunkPlan, UploadError> {
    validate_policy(policy)?;

    if file_size < policy.min_chunk_size {
        return Err(UploadError::InvalidSize {
            size: file_size,
            reason: format!(
                "below the {} byte chunked upload minimum, use the single-file upload",
                policy.min_chunk_size
            ),
        });
    }

    let chunk_size = policy.max_chunk_size;
    let required = file_size.div_ceil(chunk_size);
    if required > u64::from(policy.max_chunks) {
        return Err(UploadError::TooManyChunks {
            required,
            max: policy.max_chunks,
        });
    }

    let chunks = (0..required)
        .map(|i| {
            let offset = i * chunk_size;
            PlannedChunk {
                sequence: (i + 1) as u32,
                range: ByteRange::new(offset, chunk_size.min(file_size - offset)),
            }
        })
        .collect();

    Ok(ChunkPlan {
        file_size,
        chunk_size,
        chunks,
    })
}

fn validate_policy(policy: &ChunkPolicy) -> Result<(), UploadError> {
    if policy.max_chunk_size == 0
        || policy.max_chunk_size < policy.min_chunk_size
        || policy.max_chunk_size > MAX_CHUNK_SIZE
    {
        return Err(UploadError::InvalidSize {
            size: policy.max_chunk_size,
            reason: format!(
                "chunk size must be between {} and {} bytes",
                policy.min_chunk_size.max(1),
                MAX_CHUNK_SIZE
            ),
        });
    }

    if policy.max_chunks == 0 || policy.max_chunks > MAX_CHUNKS {
        return Err(UploadError::InvalidSize {
            size: u64::from(policy.max_chunks),
            reason: format!("chunk count limit must be between 1 and {}", MAX_CHUNKS),
        });
    }

    Ok(())
}
