//! Error types for the Cleaners domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum; only the variants of [`Error`]
//! ever reach a caller of the orchestrator.

use thiserror::Error;

/// The top-level error type returned by the message orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// The user message was empty or whitespace only.
    #[error("Message must not be empty")]
    EmptyInput,

    /// The model gateway failed; no reply was produced.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] GatewayError),

    /// Session memory itself could not be reached.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// The session exists but belongs to another caller.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// Failures of knowledge-base management (indexing, search, deletion).
#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Invalid knowledge item: {0}")]
    Invalid(String),

    #[error("Vector index unavailable: {0}")]
    Index(#[from] RetrievalError),

    #[error("Knowledge storage unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Index query failed: {0}")]
    QueryFailed(String),

    #[error("Retriever not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("Shop lookup failed: {0}")]
    QueryFailed(String),

    #[error("Shop directory not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
