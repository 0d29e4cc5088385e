//! Memoria - semantic memory for AI agents
//!
//! Memories are ingested with deduplication and size-aware compression,
//! embedded into fixed-dimension vectors, and served back through semantic
//! search and bounded graph traversal. A decay engine walks every memory
//! through `active -> dormant -> archived -> expired`, and a consolidation
//! engine clusters related memories with DBSCAN over cosine distance.
//!
//! # Modules
//!
//! - [`engine`] — ingest, search, list, relations, consolidation
//! - [`storage`] — SQLite persistence with soft-delete discipline
//! - [`embedding`] — pluggable `text -> vector` with a dimension invariant
//! - [`cache`] — two-tier TTL cache (remote preferred, local fallback)
//! - [`lifecycle`] — decay scoring, preservation, retention cleanup
//! - [`clustering`] — DBSCAN plus merge/split maintenance
//! - [`jobs`] — durable topic queues and background workers
//! - [`rpc`] — line-delimited JSON-RPC surface and tool catalog

pub mod cache;
pub mod clustering;
pub mod compress;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod lifecycle;
pub mod rpc;
pub mod scoring;
pub mod storage;
pub mod types;
pub mod vector;
pub mod window;

pub use error::{MemoriaError, Result};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
