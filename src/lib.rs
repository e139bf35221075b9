//! cspace bridge library
//!
//! DingTalk integration shim whose core is the chunked upload transaction
//! protocol of the platform's file space. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `upload`: Chunk planning, session tracking and the upload coordinator
//! - `transport`: Typed clients for the platform's upload and corporation APIs
//! - `routes`: Thin HTTP routes over the coordinator and platform client

pub mod config;
pub mod routes;
pub mod state;
pub mod transport;
pub mod upload;
