//! DingTalk cspace transport
//!
//! The only place that speaks HTTP to the platform. The coordinator sees the
//! [`CspaceTransport`] trait and typed records; `HttpTransport` maps them onto
//! the open API:
//!
//! - `GET  /file/upload/transaction` opens (without `upload_id`) or commits
//!   (with `upload_id`) a chunked transaction
//! - `POST /file/upload/chunk` sends one chunk as multipart `file`
//! - `POST /file/upload/single` sends a small file in one request
//! - `POST /media/upload` sends a message media file as multipart `media`
//!
//! [`PlatformTransport`] covers the corporation-level calls the routes make:
//! callback registration and the micro app list.

mod client;
#[cfg(test)]
pub mod mock;
mod types;

pub use client::{CspaceTransport, HttpTransport, PlatformTransport};
pub use types::{
    decode_reply, ApiReply, CommitTransactionRequest, CommitTransactionResponse, MediaType,
    Microapp, MicroappListResponse, OpenTransactionRequest, OpenTransactionResponse,
    RegisterCallbackRequest, RegisterCallbackResponse, TransportError, UploadChunkRequest,
    UploadChunkResponse, UploadMediaRequest, UploadMediaResponse, UploadSingleRequest,
    UploadSingleResponse,
};
