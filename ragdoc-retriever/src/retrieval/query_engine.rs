//! End-to-end question answering over an ingested corpus.
//!
//! A query moves through these stages:
//!
//! ```text
//! question ─▶ answer cache ─hit─▶ answer
//!               │ miss
//!               ▼
//!           embedding (embedding cache)
//!               ▼
//!           top-K search (search cache) ─empty─▶ NO_RELEVANT_INFORMATION
//!               ▼
//!           budget + label passages ─▶ prompt ─▶ completion
//!               ▼
//!           answer cache ─▶ answer
//! ```
//!
//! All three caches share the key produced by [`cache_key`]. A failed
//! completion becomes a visible `"Error: ..."` answer and is not cached; a
//! failed embedding or store read is returned as an error.
//!
//! ## Concurrency
//!
//! [`QueryEngine`] is shared as `Arc<QueryEngine>`. Queries run concurrently
//! with each other and with [`rebuild_index`](QueryEngine::rebuild_index).
//! Rebuilds are serialized among themselves. Each rebuild bumps a corpus
//! generation before clearing cached results. A query writes its search
//! results and answer first and re-reads the generation afterwards, dropping
//! the entry if a rebuild started while it was running, so stale passages
//! never outlive the rebuild that replaced them.
//!
//! Dropping a `query` future cancels it. The answer is cached synchronously
//! after the completion returns, so a cancelled query leaves either a complete
//! entry or none.

use crate::error::{Result, RetrieverError};
use crate::generation::CompletionProvider;
use crate::retrieval::cache::{CacheSettings, CacheStats, TieredCache, TtlCache, cache_key};
use crate::retrieval::ingest::{IndexRefresh, IngestOutcome, Ingestor};
use crate::retrieval::similarity_index::{IndexEntry, IndexStrategy, SimilarityIndex};
use crate::storage::{DocumentId, DocumentStore};
use ragdoc_context::{ContextBudgeter, assemble};
use ragdoc_embed::EmbeddingProvider;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Answer returned when retrieval finds no passages.
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information to answer your question.";

/// Default number of passages retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Tuning for a [`QueryEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    pub budgeter: ContextBudgeter,
    pub cache: CacheSettings,
    pub strategy: IndexStrategy,
    pub refresh: IndexRefresh,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            budgeter: ContextBudgeter::new(4096, 500, ragdoc_context::DEFAULT_TOKENS_PER_WORD),
            cache: CacheSettings::default(),
            strategy: IndexStrategy::default(),
            refresh: IndexRefresh::default(),
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub indexed_documents: usize,
    pub dimension: Option<usize>,
    pub strategy: IndexStrategy,
    pub refresh: IndexRefresh,
    pub embedding_cache: CacheStats,
    pub search_cache: CacheStats,
    pub answer_cache: CacheStats,
}

/// Retrieval-augmented question answering over a [`DocumentStore`].
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    ingestor: Ingestor,
    index: SimilarityIndex,
    cache: TieredCache,
    settings: EngineSettings,
    generation: AtomicU64,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("embedder", &self.embedder.provider_name())
            .field("completer", &self.completer.provider_name())
            .field("index", &self.index)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Create an engine with an empty index. Call [`rebuild_index`](Self::rebuild_index)
    /// or use [`start`](Self::start) to load the stored corpus.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&store), Arc::clone(&embedder)),
            index: SimilarityIndex::new(settings.strategy),
            cache: TieredCache::new(settings.cache),
            store,
            embedder,
            completer,
            settings,
            generation: AtomicU64::new(0),
            rebuild_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an engine and build its index from the store.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let engine = Self::new(store, embedder, completer, settings);
        engine.rebuild_index().await?;
        Ok(engine)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// Fails with [`RetrieverError::EmptyQuestion`] for blank input and with
    /// [`RetrieverError::Embedding`] when the question cannot be embedded.
    pub async fn query(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(RetrieverError::EmptyQuestion);
        }

        let key = cache_key(question);
        if let Some(answer) = self.cache.answers.get(&key) {
            debug!("Answer cache hit for {:?}", key);
            return Ok(answer);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let embedding = self.question_embedding(&key, question).await?;
        let passages = self.retrieve(&key, &embedding, generation).await?;
        if passages.is_empty() {
            debug!("No passages retrieved for {:?}", key);
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        let assembled = assemble(&self.settings.budgeter, &passages, question);
        debug!(
            "Assembled prompt from {} passages at {} words each",
            assembled.passages.len(),
            assembled.words_per_passage
        );

        match self.completer.complete(&assembled.prompt).await {
            Ok(answer) => {
                cache_if_current(
                    &self.cache.answers,
                    &self.generation,
                    generation,
                    key,
                    answer.clone(),
                );
                Ok(answer)
            }
            Err(e) => {
                warn!(
                    "Completion provider {} failed: {}",
                    self.completer.provider_name(),
                    e
                );
                Ok(format!("Error: {e}"))
            }
        }
    }

    async fn question_embedding(&self, key: &str, question: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.embeddings.get(&key.to_string()) {
            debug!("Embedding cache hit for {:?}", key);
            return Ok(embedding);
        }

        let embedding = self.embedder.embed_text(question.trim()).await?;
        self.cache.embeddings.set(key.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn retrieve(&self, key: &str, embedding: &[f32], generation: u64) -> Result<Vec<String>> {
        if let Some(passages) = self.cache.search.get(&key.to_string()) {
            debug!("Search cache hit for {:?}", key);
            return Ok(passages);
        }

        let hits = self.index.search(embedding, self.settings.top_k);
        let ids: Vec<DocumentId> = hits.iter().map(|hit| hit.document_id).collect();
        let passages = self.store.contents_by_ids(&ids).await?;

        if !passages.is_empty() {
            cache_if_current(
                &self.cache.search,
                &self.generation,
                generation,
                key.to_string(),
                passages.clone(),
            );
        }
        Ok(passages)
    }

    /// Rebuild the index from the store and drop cached results.
    ///
    /// Returns the number of indexed documents. Queries keep running against
    /// the previous snapshot until the new one is swapped in.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let _guard = self.rebuild_lock.lock().await;

        let embeddings = self.store.all_embeddings().await?;
        let count = self.index.build(embeddings.into_iter().map(IndexEntry::from));
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_results();

        info!(
            "Rebuilt {} index with {} documents",
            self.index.strategy(),
            count
        );
        Ok(count)
    }

    /// Add a document, rebuilding the index if the refresh policy asks for it.
    pub async fn ingest(&self, content: &str, metadata: Option<String>) -> Result<IngestOutcome> {
        let outcome = self.ingestor.ingest(content, metadata).await?;
        if outcome.is_created() && self.settings.refresh.rebuilds_on_ingest() {
            self.rebuild_index().await?;
        }
        Ok(outcome)
    }

    /// Add several documents, rebuilding at most once.
    pub async fn ingest_batch(
        &self,
        documents: Vec<(String, Option<String>)>,
    ) -> Result<Vec<IngestOutcome>> {
        let outcomes = self.ingestor.ingest_batch(documents).await?;
        if outcomes.iter().any(IngestOutcome::is_created)
            && self.settings.refresh.rebuilds_on_ingest()
        {
            self.rebuild_index().await?;
        }
        Ok(outcomes)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            indexed_documents: self.index.len(),
            dimension: self.index.dimension(),
            strategy: self.index.strategy(),
            refresh: self.settings.refresh,
            embedding_cache: self.cache.embeddings.stats(),
            search_cache: self.cache.search.stats(),
            answer_cache: self.cache.answers.stats(),
        }
    }

    /// Rebuild the index every `interval` until the handle is aborted.
    pub fn spawn_periodic_rebuild(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.rebuild_index().await {
                    warn!("Periodic index rebuild failed: {}", e);
                }
            }
        })
    }
}

/// Cache `value` unless the corpus generation moved past `generation`.
///
/// The entry is written before the generation is re-read. A rebuild bumps the
/// generation before clearing results, so a racing rebuild either clears this
/// entry or is seen here and the entry is removed. Returns whether it stayed.
fn cache_if_current<V>(
    tier: &TtlCache<String, V>,
    corpus_generation: &AtomicU64,
    generation: u64,
    key: String,
    value: V,
) -> bool
where
    V: Clone + Send + Sync + 'static,
{
    tier.set(key.clone(), value);
    if corpus_generation.load(Ordering::SeqCst) == generation {
        return true;
    }
    debug!("Corpus changed during query, not caching {:?}", key);
    tier.invalidate(&key);
    false
}
