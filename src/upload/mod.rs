//! Chunked Upload Module (cspace transactions)
//!
//! Implements large file uploads to the DingTalk file space with:
//! - Deterministic chunk planning within the platform's size limits
//! - Per-session state tracking with out-of-order chunk acks
//! - Atomic commit once every chunk is acknowledged
//!
//! Protocol Flow:
//! 1. Plan byte ranges for the file (100KiB to 8MiB, at most 10000 chunks)
//! 2. Open a transaction declaring size and chunk count, get an upload ID
//! 3. Upload each chunk tagged with its 1-based sequence, concurrently
//! 4. Commit with the same size and count, get the file handle
//!
//! Files below the chunked minimum go through the single-request upload.

pub mod coordinator;
pub mod planner;
pub mod source;
pub mod tracker;
pub mod types;

pub use coordinator::UploadCoordinator;
pub use planner::plan;
pub use source::{ByteSource, FileSource, MemorySource};
pub use tracker::{AckOutcome, SessionHandle, TransactionTracker};
pub use types::*;
