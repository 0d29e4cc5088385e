//! Error types for Memoria

use thiserror::Error;

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, MemoriaError>;

/// Main error type for Memoria
#[derive(Error, Debug)]
pub enum MemoriaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MemoriaError {
    /// Check if error is retryable by a background worker
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoriaError::Database(_)
                | MemoriaError::Cache(_)
                | MemoriaError::Queue(_)
                | MemoriaError::RateLimited(_)
                | MemoriaError::Timeout(_)
                | MemoriaError::Io(_)
        )
    }

    /// Get error code for the RPC protocol
    pub fn code(&self) -> i64 {
        match self {
            MemoriaError::InvalidParams(_) => -32602,
            MemoriaError::NotFound(_) => -32001,
            MemoriaError::RateLimited(_) => -32004,
            MemoriaError::Conflict(_) | MemoriaError::DimensionMismatch { .. } => -32005,
            MemoriaError::Timeout(_) => -32007,
            _ => -32000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MemoriaError::RateLimited(5).is_retryable());
        assert!(MemoriaError::Timeout("traversal".into()).is_retryable());
        assert!(!MemoriaError::InvalidParams("bad".into()).is_retryable());
        assert!(!MemoriaError::DimensionMismatch {
            expected: 384,
            actual: 768
        }
        .is_retryable());
    }

    #[test]
    fn test_rpc_codes() {
        assert_eq!(MemoriaError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(MemoriaError::NotFound("id".into()).code(), -32001);
        assert_eq!(
            MemoriaError::DimensionMismatch {
                expected: 384,
                actual: 512
            }
            .code(),
            -32005
        );
    }
}
