//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base URL of a local OpenAI-compatible server (LM Studio).
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:1234";

/// Default embedding model served by the local endpoint.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-nomic-embed-text-v1.5";

/// Configuration for embedding providers
///
/// The same configuration drives both the HTTP provider (which uses
/// `endpoint_url`, `api_key` and `timeout_secs`) and the local FastEmbed
/// provider (which uses `model_cache_path`). `model_name` is shared.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Base URL of the OpenAI-compatible server, without the `/v1` suffix
    #[builder(default = r#"DEFAULT_ENDPOINT_URL.to_string()"#)]
    pub endpoint_url: String,
    /// Name of the embedding model to use
    pub model_name: String,
    /// Bearer token sent with HTTP requests, if the server needs one
    #[builder(setter(strip_option), default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[builder(default = "600")]
    pub timeout_secs: u64,
    /// Output dimension requested from the server (for models that support it)
    #[builder(setter(strip_option), default)]
    pub dimensions: Option<usize>,
    /// Maximum number of texts sent in a single request
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Directory where local models are downloaded and cached
    #[builder(default = r#"PathBuf::from("models")"#)]
    pub model_cache_path: PathBuf,
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for an OpenAI-compatible endpoint
    pub fn http(endpoint_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for a local FastEmbed model cached under `model_cache_path`
    pub fn local<P: AsRef<Path>>(model_cache_path: P, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_cache_path: model_cache_path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the bearer token (builder style)
    pub fn with_api_key<S: Into<String>>(self, api_key: S) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Set the request timeout (builder style)
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout_secs: timeout.as_secs(),
            ..self
        }
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full URL of the embeddings route
    pub fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.endpoint_url.trim_end_matches('/'))
    }

    /// Validate settings that would otherwise fail on the first request
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be at least 1"));
        }
        if !(self.endpoint_url.starts_with("http://") || self.endpoint_url.starts_with("https://"))
        {
            tracing::error!("Unsupported endpoint URL: {}", self.endpoint_url);
            return Err(EmbedError::invalid_config(format!(
                "endpoint URL must start with http:// or https://, got {}",
                self.endpoint_url
            )));
        }
        tracing::debug!("Embedding configuration valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfigBuilder::default()
            .model_name(DEFAULT_EMBEDDING_MODEL)
            .build()
            .expect("Failed to build default EmbedConfig")
    }
}
