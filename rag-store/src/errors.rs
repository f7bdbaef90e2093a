//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// I/O or filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A vector produced at runtime does not fit the index.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// The persisted index was built with another embedding dimensionality.
    #[error("persisted index has dimension {stored}, embedding provider produces {expected}")]
    DimensionMismatch { stored: usize, expected: usize },

    /// A source produced no indexable text.
    #[error("document '{0}' contains no text")]
    EmptyDocument(String),

    /// A URL source could not be fetched.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Embedding/generation provider failures.
    #[error(transparent)]
    Provider(#[from] ai_llm_service::AiLlmError),

    /// The persisted index exists but is unusable.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// Qdrant client errors (wrapped).
    #[error("qdrant error: {0}")]
    Qdrant(String),
}

impl RagError {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
