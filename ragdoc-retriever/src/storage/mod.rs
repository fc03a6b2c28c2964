//! Storage abstraction layer for ragdoc-retriever
//!
//! Documents are stored whole, each with the embedding of its full text and a
//! content hash that keeps the corpus free of duplicates. The query engine only
//! needs a handful of operations from a store, collected in [`DocumentStore`]:
//!
//! - deduplicating insertion keyed by content hash
//! - a snapshot of every `(id, embedding)` pair for index rebuilds
//! - passage text lookup by id, in caller order
//!
//! ## Architecture
//!
//! ```text
//! DocumentStore ─┬─ SqliteStore  (persistent, `<base>/.ragdoc.db`)
//!                └─ MemoryStore  (tests and ephemeral corpora)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

/// Database ID for a stored document.
pub type DocumentId = i64;

/// Hex-encoded blake3 hash of `content`.
pub fn content_hash(content: &str) -> String {
    hex::encode(blake3::hash(content.as_bytes()).as_bytes())
}

/// A document ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub content: String,
    pub embedding: Vec<f32>,
    pub content_hash: String,
    pub metadata: Option<String>,
}

impl NewDocument {
    /// Build a document, hashing `content`.
    pub fn new(content: impl Into<String>, embedding: Vec<f32>, metadata: Option<String>) -> Self {
        let content = content.into();
        Self {
            content_hash: content_hash(&content),
            content,
            embedding,
            metadata,
        }
    }
}

/// Result of a deduplicating insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum AddOutcome {
    Created(DocumentId),
    AlreadyExists(DocumentId),
}

impl AddOutcome {
    pub fn id(&self) -> DocumentId {
        match self {
            AddOutcome::Created(id) | AddOutcome::AlreadyExists(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AddOutcome::Created(_))
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub content_hash: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The `(id, embedding)` pair an index rebuild needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEmbedding {
    pub id: DocumentId,
    pub embedding: Vec<f32>,
}

/// Document persistence used by the query engine and the ingest path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `document` unless a document with the same content hash exists.
    async fn add_if_hash_absent(&self, document: NewDocument) -> Result<AddOutcome>;

    /// Whether a document with this content hash is stored
    async fn exists_by_hash(&self, content_hash: &str) -> Result<bool>;

    /// Every stored embedding, ordered by insertion
    async fn all_embeddings(&self) -> Result<Vec<DocumentEmbedding>>;

    /// Passage text for `ids`, in the same order. Unknown ids are skipped.
    async fn contents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<String>>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>>;

    async fn document_count(&self) -> Result<usize>;
}
