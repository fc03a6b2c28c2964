//! TOML configuration for the retrieval service.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration pointed at a local LM Studio server:
//!
//! ```toml
//! endpoint_url = "http://localhost:1234"
//! llm_model = "deepseek/deepseek-r1-0528-qwen3-8b"
//! embedding_model = "text-embedding-nomic-embed-text-v1.5"
//! top_k = 3
//! index_strategy = "flat"
//! index_refresh = "on_ingest"
//! ```

use crate::error::{Result, RetrieverError};
use crate::generation::CompletionConfig;
use crate::retrieval::cache::CacheSettings;
use crate::retrieval::ingest::IndexRefresh;
use crate::retrieval::query_engine::EngineSettings;
use crate::retrieval::similarity_index::IndexStrategy;
use ragdoc_context::{ContextBudgeter, DEFAULT_SYSTEM_PROMPT, DEFAULT_TOKENS_PER_WORD};
use ragdoc_embed::{DEFAULT_EMBEDDING_MODEL, DEFAULT_ENDPOINT_URL, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which embedding provider the service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// `/v1/embeddings` on `endpoint_url`
    #[default]
    Http,
    /// A local ONNX model run through fastembed
    Fastembed,
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub llm_model: String,
    pub embedding_model: String,
    pub embedding_backend: EmbeddingBackend,
    /// Download cache for local embedding models
    pub model_cache_path: PathBuf,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub top_k: usize,
    /// Generation limit sent to the model
    pub max_tokens: usize,
    pub context_window_tokens: usize,
    /// Tokens of the context window kept free for the answer
    pub answer_reserve_tokens: usize,
    pub tokens_per_word: f64,
    pub system_prompt: String,
    pub embedding_cache_ttl_secs: u64,
    pub search_cache_ttl_secs: u64,
    pub answer_cache_ttl_secs: u64,
    /// Per-tier entry limit, 0 for unbounded
    pub cache_capacity: usize,
    pub index_strategy: IndexStrategy,
    pub index_refresh: IndexRefresh,
}

impl Default for RagConfig {
    fn default() -> Self {
        let cache = CacheSettings::default();
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            api_key: None,
            llm_model: "deepseek/deepseek-r1-0528-qwen3-8b".to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_backend: EmbeddingBackend::default(),
            model_cache_path: PathBuf::from("models"),
            timeout_seconds: 600,
            temperature: 0.5,
            top_k: 3,
            max_tokens: 500,
            context_window_tokens: 4096,
            answer_reserve_tokens: 500,
            tokens_per_word: DEFAULT_TOKENS_PER_WORD,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            embedding_cache_ttl_secs: cache.embedding_ttl.as_secs(),
            search_cache_ttl_secs: cache.search_ttl.as_secs(),
            answer_cache_ttl_secs: cache.answer_ttl.as_secs(),
            cache_capacity: cache.capacity,
            index_strategy: IndexStrategy::default(),
            index_refresh: IndexRefresh::default(),
        }
    }
}

impl RagConfig {
    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrieverError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| RetrieverError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RetrieverError::config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrieverError::config("top_k must be at least 1"));
        }
        if !(self.tokens_per_word > 0.0) {
            return Err(RetrieverError::config("tokens_per_word must be positive"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RetrieverError::config("temperature must be within 0.0..=2.0"));
        }
        if self.timeout_seconds == 0 {
            return Err(RetrieverError::config("timeout_seconds must be positive"));
        }
        Ok(())
    }

    pub fn embed_config(&self) -> EmbedConfig {
        let config = match self.embedding_backend {
            EmbeddingBackend::Http => {
                EmbedConfig::http(self.endpoint_url.clone(), self.embedding_model.clone())
            }
            EmbeddingBackend::Fastembed => {
                EmbedConfig::local(&self.model_cache_path, self.embedding_model.clone())
            }
        }
        .with_timeout(Duration::from_secs(self.timeout_seconds));

        match &self.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            endpoint_url: self.endpoint_url.clone(),
            model: self.llm_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_seconds),
            system_prompt: self.system_prompt.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            embedding_ttl: Duration::from_secs(self.embedding_cache_ttl_secs),
            search_ttl: Duration::from_secs(self.search_cache_ttl_secs),
            answer_ttl: Duration::from_secs(self.answer_cache_ttl_secs),
            capacity: self.cache_capacity,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            top_k: self.top_k,
            budgeter: ContextBudgeter::new(
                self.context_window_tokens,
                self.answer_reserve_tokens,
                self.tokens_per_word,
            ),
            cache: self.cache_settings(),
            strategy: self.index_strategy,
            refresh: self.index_refresh,
        }
    }
}
