//! Error types for the retrieval and answer pipeline

use ragdoc_embed::EmbedError;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Errors raised by the query engine and its numeric primitives.
///
/// Only failures on the critical path surface here. Completion failures are
/// turned into a visible answer string by the engine, and an empty retrieval
/// is a normal outcome rather than an error.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// Two vectors that must be compared have different lengths
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A stored embedding blob is not a whole number of f32 values
    #[error("Invalid embedding bytes: length {len} is not a multiple of 4")]
    InvalidVectorBytes { len: usize },

    /// The caller passed an empty or whitespace-only question
    #[error("Question must not be empty")]
    EmptyQuestion,

    /// A document with no text was offered for ingest
    #[error("Document content must not be empty")]
    EmptyDocument,

    /// The embedding provider failed; no answer is possible without an embedding
    #[error("Embedding failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    /// The document store failed
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: anyhow::Error,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl RetrieverError {
    /// Create a configuration error with a custom message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
