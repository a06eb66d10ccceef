//! Error types for the codeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all codeloop operations.
///
/// Anything that reaches the caller as an `Error` aborts the current turn.
/// Failures of the *generated* code are not errors: they come back inside
/// an [`ExecutionResult`](crate::runnable::ExecutionResult).
#[derive(Debug, Error)]
pub enum Error {
    // --- Model stream errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval / store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Executor infrastructure errors ---
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    // --- Cache file errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Input validation ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding dimension mismatch: store has {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Persisted store is corrupted: {0}")]
    Corrupted(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn interpreter '{interpreter}': {reason}")]
    Spawn { interpreter: String, reason: String },

    #[error("Executor I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to write cache file {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}
