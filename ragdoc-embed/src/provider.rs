//! Embedding provider trait and the local FastEmbed implementation

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector, or 0 when
    /// there are no embeddings.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of embeddings produced by this provider, once known
    fn embedding_dimension(&self) -> Option<usize>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Tracks the embedding dimension a provider has committed to.
///
/// The dimension is learned from the first vector observed and never changes
/// afterwards; any later vector of a different length is rejected.
#[derive(Debug, Default)]
pub struct DimensionGuard {
    learned: OnceLock<usize>,
}

impl DimensionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `embedding` against the learned dimension, learning it if unset.
    pub fn check(&self, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(EmbedError::malformed("provider returned an empty embedding"));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::malformed(
                "provider returned non-finite values in embedding",
            ));
        }
        let expected = *self.learned.get_or_init(|| {
            tracing::info!("Learned embedding dimension: {}", embedding.len());
            embedding.len()
        });
        if expected != embedding.len() {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// The learned dimension, if any vector has been observed yet.
    pub fn dimension(&self) -> Option<usize> {
        self.learned.get().copied()
    }
}

/// Type alias for cached model entries
type ModelCacheEntry = Arc<Mutex<TextEmbedding>>;

/// Global cache for initialized local models to avoid reloading ONNX weights
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

/// Get the global model cache
fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Map a configured model name onto one of FastEmbed's built-in models.
pub fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "nomic-embed-text-v1.5"
        | "nomic-ai/nomic-embed-text-v1.5"
        | "text-embedding-nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(EmbedError::invalid_config(format!(
            "no built-in local model named {other}"
        ))),
    }
}

/// FastEmbed-based embedding provider running ONNX models in-process
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: Arc<DimensionGuard>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension.dimension())
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize) before use.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
            dimension: Arc::new(DimensionGuard::new()),
        }
    }

    /// Downloads (if needed) and loads the model, reusing a cached instance when possible.
    pub async fn initialize(&mut self) -> Result<()> {
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );
        let model_kind = builtin_model(self.config.model_name())?;
        let cache_key = self.create_cache_key();

        let cached = {
            let cache = get_model_cache().lock().unwrap();
            cache.get(&cache_key).map(Arc::clone)
        };

        let model = match cached {
            Some(model) => {
                tracing::info!("Using cached model for: {}", self.config.model_name());
                model
            }
            None => {
                let cache_dir = self.config.model_cache_path.clone();
                let model = tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
                    let init_options = InitOptions::new(model_kind)
                        .with_cache_dir(cache_dir)
                        .with_show_download_progress(true);
                    TextEmbedding::try_new(init_options).map_err(|e| EmbedError::External { source: e })
                })
                .await??;
                let model = Arc::new(Mutex::new(model));
                get_model_cache()
                    .lock()
                    .unwrap()
                    .insert(cache_key, Arc::clone(&model));
                model
            }
        };

        self.model = Some(model);

        // Learn the dimension up front so callers can size indexes before the first query
        let probe = self.embed_text("dimension probe").await?;
        tracing::info!(
            "Model {} loaded successfully. Dimension: {}",
            self.config.model_name(),
            probe.len()
        );
        Ok(())
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(self.config.model_name.to_lowercase().as_bytes());
        hasher.write(self.config.model_cache_path.to_string_lossy().as_bytes());
        format!("v1:{:x}", hasher.finish())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        get_model_cache().lock().unwrap().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        get_model_cache().lock().unwrap().len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::malformed("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating local embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model.lock().unwrap();
                model_guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            for embedding in &batch {
                self.dimension.check(embedding)?;
            }
            all_embeddings.extend(batch);
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.dimension.dimension()
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
