//! Error types for the embedding providers

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Every variant describes a failure scoped to the call that produced it.
/// Providers never retry internally, so callers see the first failure.
///
/// # Error Categories
///
/// - **Provider Errors**: the remote endpoint answered with a non-success status
/// - **Payload Errors**: the response body did not have the expected shape
/// - **Dimension Errors**: a vector disagreed with the dimension learned earlier
/// - **Configuration Errors**: invalid endpoint or model settings
/// - **Transport / Runtime Errors**: HTTP, task join, and dependency failures
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding endpoint answered with a non-success status
    #[error("Embedding API failed with status {status}: {body}")]
    Provider { status: u16, body: String },

    /// The response payload was missing fields or could not be decoded
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },

    /// A vector's length disagrees with the dimension learned from the first one
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Error when provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Transport errors talking to the embedding endpoint
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    ///
    /// Used when the provider answered successfully but the body is missing
    /// the embedding data or carries values that cannot be used.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Whether this error came from the remote provider rather than local setup.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::MalformedResponse { .. } | Self::Http { .. }
        )
    }
}
