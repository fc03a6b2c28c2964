//! In-memory [`DocumentStore`] for tests and throwaway corpora.

use super::{
    AddOutcome, DocumentEmbedding, DocumentId, DocumentRecord, DocumentStore, NewDocument,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    /// Ordered by id, which is also insertion order
    documents: Vec<DocumentRecord>,
    by_hash: HashMap<String, DocumentId>,
    next_id: DocumentId,
}

/// A vector-backed document store. Ids start at 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add_if_hash_absent(&self, document: NewDocument) -> Result<AddOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&id) = inner.by_hash.get(&document.content_hash) {
            return Ok(AddOutcome::AlreadyExists(id));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.by_hash.insert(document.content_hash.clone(), id);
        inner.documents.push(DocumentRecord {
            id,
            content: document.content,
            embedding: document.embedding,
            content_hash: document.content_hash,
            metadata: document.metadata,
            created_at: Utc::now(),
        });
        Ok(AddOutcome::Created(id))
    }

    async fn exists_by_hash(&self, content_hash: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().by_hash.contains_key(content_hash))
    }

    async fn all_embeddings(&self) -> Result<Vec<DocumentEmbedding>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .documents
            .iter()
            .map(|doc| DocumentEmbedding {
                id: doc.id,
                embedding: doc.embedding.clone(),
            })
            .collect())
    }

    async fn contents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                inner
                    .documents
                    .binary_search_by_key(id, |doc| doc.id)
                    .ok()
                    .map(|pos| inner.documents[pos].content.clone())
            })
            .collect())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .documents
            .binary_search_by_key(&id, |doc| doc.id)
            .ok()
            .map(|pos| inner.documents[pos].clone()))
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.inner.lock().unwrap().documents.len())
    }
}
