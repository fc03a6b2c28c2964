//! Document ingest: hash, deduplicate, embed, persist.
//!
//! The [`Ingestor`] never touches the similarity index. Whether a successful
//! ingest is followed by an index rebuild is decided by the engine according to
//! its [`IndexRefresh`] policy.

use crate::error::{Result, RetrieverError};
use crate::storage::{AddOutcome, DocumentId, DocumentStore, NewDocument, content_hash};
use futures::stream::{self, StreamExt, TryStreamExt};
use ragdoc_embed::{EmbedError, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Concurrent store lookups during a batch ingest.
const HASH_LOOKUP_CONCURRENCY: usize = 8;

/// When the engine rebuilds its index after documents are added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRefresh {
    /// Rebuild after every ingest that created a document
    #[default]
    OnIngest,

    /// Only rebuild on an explicit `rebuild_index` call or a periodic task
    Manual,
}

impl IndexRefresh {
    pub fn rebuilds_on_ingest(&self) -> bool {
        matches!(self, IndexRefresh::OnIngest)
    }
}

impl std::fmt::Display for IndexRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexRefresh::OnIngest => write!(f, "on-ingest"),
            IndexRefresh::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for IndexRefresh {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on-ingest" | "on_ingest" | "eager" => Ok(IndexRefresh::OnIngest),
            "manual" => Ok(IndexRefresh::Manual),
            _ => Err(format!(
                "Invalid index refresh policy: '{s}'. Valid values are: on-ingest, manual"
            )),
        }
    }
}

/// What happened to one offered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created { id: DocumentId },
    Duplicate { content_hash: String },
}

impl IngestOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, IngestOutcome::Created { .. })
    }
}

/// Adds documents to a store, skipping content that is already present.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Ingest one document.
    ///
    /// The content hash is checked before embedding so duplicates cost no
    /// provider call.
    pub async fn ingest(&self, content: &str, metadata: Option<String>) -> Result<IngestOutcome> {
        if content.trim().is_empty() {
            return Err(RetrieverError::EmptyDocument);
        }

        let hash = content_hash(content);
        if self.store.exists_by_hash(&hash).await? {
            tracing::debug!("Skipping duplicate document {}", hash);
            return Ok(IngestOutcome::Duplicate { content_hash: hash });
        }

        let embedding = self.embedder.embed_text(content).await?;
        let outcome = self
            .store
            .add_if_hash_absent(NewDocument::new(content, embedding, metadata))
            .await?;
        Ok(Self::outcome(outcome, hash))
    }

    /// Ingest several documents with one batched embedding call.
    ///
    /// Outcomes are returned in input order. Repeats within the batch are
    /// reported as duplicates of their first occurrence.
    pub async fn ingest_batch(
        &self,
        documents: Vec<(String, Option<String>)>,
    ) -> Result<Vec<IngestOutcome>> {
        if documents.iter().any(|(content, _)| content.trim().is_empty()) {
            return Err(RetrieverError::EmptyDocument);
        }

        let hashes: Vec<String> = documents.iter().map(|(c, _)| content_hash(c)).collect();
        let stored: Vec<bool> = stream::iter(hashes.iter())
            .map(|hash| self.store.exists_by_hash(hash))
            .buffered(HASH_LOOKUP_CONCURRENCY)
            .try_collect()
            .await?;

        let mut seen = HashSet::new();
        let fresh: Vec<usize> = (0..documents.len())
            .filter(|&i| !stored[i] && seen.insert(hashes[i].as_str()))
            .collect();

        let texts: Vec<String> = fresh.iter().map(|&i| documents[i].0.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts).await?.embeddings;
        if embeddings.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "provider returned {} embeddings for {} documents",
                embeddings.len(),
                texts.len()
            ))
            .into());
        }

        let mut outcomes: Vec<Option<IngestOutcome>> = vec![None; documents.len()];
        let mut documents: Vec<Option<(String, Option<String>)>> =
            documents.into_iter().map(Some).collect();
        for (&i, embedding) in fresh.iter().zip(embeddings) {
            if let Some((content, metadata)) = documents[i].take() {
                let added = self
                    .store
                    .add_if_hash_absent(NewDocument::new(content, embedding, metadata))
                    .await?;
                outcomes[i] = Some(Self::outcome(added, hashes[i].clone()));
            }
        }

        let outcomes: Vec<IngestOutcome> = outcomes
            .into_iter()
            .zip(hashes)
            .map(|(outcome, hash)| {
                outcome.unwrap_or(IngestOutcome::Duplicate { content_hash: hash })
            })
            .collect();

        tracing::info!(
            "Ingested batch of {}: {} created",
            outcomes.len(),
            outcomes.iter().filter(|o| o.is_created()).count()
        );
        Ok(outcomes)
    }

    fn outcome(added: AddOutcome, hash: String) -> IngestOutcome {
        match added {
            AddOutcome::Created(id) => {
                tracing::info!("Stored document {} ({})", id, hash);
                IngestOutcome::Created { id }
            }
            AddOutcome::AlreadyExists(_) => IngestOutcome::Duplicate { content_hash: hash },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use ragdoc_embed::EmbeddingResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Embeds text as `[len, 1.0]` and counts embedded texts.
    #[derive(Default)]
    struct CountingEmbedder {
        embedded: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_text(&self, text: &str) -> ragdoc_embed::Result<Vec<f32>> {
            self.embedded.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_texts(&self, texts: &[String]) -> ragdoc_embed::Result<EmbeddingResult> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(EmbeddingResult::new(
                texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect(),
            ))
        }

        fn embedding_dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn provider_name(&self) -> &str {
            "counting"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_text(&self, _text: &str) -> ragdoc_embed::Result<Vec<f32>> {
            Err(EmbedError::Provider {
                status: 500,
                body: "down".to_string(),
            })
        }

        async fn embed_texts(&self, _texts: &[String]) -> ragdoc_embed::Result<EmbeddingResult> {
            Err(EmbedError::malformed("down"))
        }

        fn embedding_dimension(&self) -> Option<usize> {
            None
        }

        fn provider_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_duplicate_skips_embedding() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::default());
        let ingestor = Ingestor::new(store.clone(), embedder.clone());

        let first = ingestor.ingest("Luke Skywalker is a Jedi", None).await?;
        let second = ingestor.ingest("Luke Skywalker is a Jedi", None).await?;

        assert_eq!(first, IngestOutcome::Created { id: 1 });
        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), 1);
        assert_eq!(store.document_count().await?, 1);
        assert!(logs_contain("Skipping duplicate document"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let ingestor = Ingestor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CountingEmbedder::default()),
        );
        assert!(matches!(
            ingestor.ingest("  \n ", None).await,
            Err(RetrieverError::EmptyDocument)
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone(), Arc::new(FailingEmbedder));

        let err = ingestor.ingest("text", None).await.unwrap_err();
        assert!(matches!(err, RetrieverError::Embedding { .. }));
        assert_eq!(store.document_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_dedups_within_and_across() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::default());
        let ingestor = Ingestor::new(store.clone(), embedder.clone());

        ingestor.ingest("already here", None).await?;

        let outcomes = ingestor
            .ingest_batch(vec![
                ("new one".to_string(), None),
                ("already here".to_string(), None),
                ("new two".to_string(), Some("tag".to_string())),
                ("new one".to_string(), None),
            ])
            .await?;

        assert_eq!(outcomes[0], IngestOutcome::Created { id: 2 });
        assert!(!outcomes[1].is_created());
        assert_eq!(outcomes[2], IngestOutcome::Created { id: 3 });
        assert!(!outcomes[3].is_created());

        // one single embed plus two batched
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), 3);
        assert_eq!(store.document_count().await?, 3);
        assert_eq!(
            store.get_document(3).await?.unwrap().metadata.as_deref(),
            Some("tag")
        );
        Ok(())
    }

    #[test]
    fn test_index_refresh_parse_and_display() {
        assert_eq!("on-ingest".parse::<IndexRefresh>().unwrap(), IndexRefresh::OnIngest);
        assert_eq!("MANUAL".parse::<IndexRefresh>().unwrap(), IndexRefresh::Manual);
        assert!("sometimes".parse::<IndexRefresh>().is_err());
        assert_eq!(IndexRefresh::OnIngest.to_string(), "on-ingest");
        assert!(IndexRefresh::default().rebuilds_on_ingest());
        assert!(!IndexRefresh::Manual.rebuilds_on_ingest());
    }
}
