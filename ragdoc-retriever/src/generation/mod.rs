//! Answer generation from an assembled prompt.
//!
//! [`CompletionProvider`] is the seam the query engine calls once per uncached
//! question. Failures are typed so the engine can turn them into a visible
//! answer without caching them.

use async_trait::async_trait;

pub mod http_completion;

pub use http_completion::{CompletionConfig, HttpCompletionProvider};

/// Errors a completion provider can report.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// The server answered with a non-success status
    #[error("completion request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The server answered successfully but without any text
    #[error("completion response contained no answer")]
    EmptyResponse,

    /// Transport failure, including timeouts
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The body could not be decoded
    #[error("malformed completion response: {message}")]
    MalformedResponse { message: String },
}

impl CompletionError {
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

/// Turns a prompt into answer text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Short name used in logs
    fn provider_name(&self) -> &str;
}
