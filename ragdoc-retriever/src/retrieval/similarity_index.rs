//! In-memory nearest-neighbour index over document embeddings.
//!
//! The index stores L2-normalized copies of every document embedding and
//! answers top-K queries by inner product, which equals cosine similarity on
//! unit vectors. Two strategies share one type:
//!
//! - [`IndexStrategy::BruteForce`]: a linear scan over the stored entries.
//! - [`IndexStrategy::Flat`]: the entries of the dominant dimension packed into
//!   one contiguous row-major matrix and scanned row by row. Queries of any
//!   other dimension, and an empty matrix, fall back to the linear scan.
//!
//! Both strategies rank identically: best score first, ties broken by
//! insertion order. Entries whose dimension differs from the query's are
//! skipped.
//!
//! ## Concurrency
//!
//! Every [`build`](SimilarityIndex::build) assembles a complete
//! `IndexSnapshot` off to the side and then swaps an `Arc` pointer under a
//! short write lock. A search clones the current pointer and scores against
//! that snapshot without holding any lock, so a rebuild never blocks readers
//! and readers never see a half-built index.

use crate::storage::{DocumentEmbedding, DocumentId};
use crate::vector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};

/// Search strategy used by a [`SimilarityIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Linear scan over every stored entry
    BruteForce,
    /// Contiguous matrix of the dominant dimension
    #[default]
    Flat,
}

impl std::fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStrategy::BruteForce => write!(f, "brute_force"),
            IndexStrategy::Flat => write!(f, "flat"),
        }
    }
}

/// A document embedding as held by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub document_id: DocumentId,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn new(document_id: DocumentId, embedding: Vec<f32>) -> Self {
        Self {
            document_id,
            embedding,
        }
    }
}

impl From<DocumentEmbedding> for IndexEntry {
    fn from(value: DocumentEmbedding) -> Self {
        Self::new(value.id, value.embedding)
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: DocumentId,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    position: usize,
    score: f32,
}

/// Descending score, then ascending insertion position.
fn rank(a: &Scored, b: &Scored) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// Packed rows of the entries sharing the dominant dimension.
#[derive(Debug, Default)]
struct FlatMatrix {
    dimension: usize,
    data: Vec<f32>,
    /// Entry position of each row
    rows: Vec<usize>,
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
    flat: Option<FlatMatrix>,
}

impl IndexSnapshot {
    fn build(entries: Vec<IndexEntry>, strategy: IndexStrategy) -> Self {
        let mut entries = entries;
        for entry in &mut entries {
            vector::normalize_in_place(&mut entry.embedding);
        }

        let dimension = entries.first().map(|e| e.embedding.len());
        let flat = match (strategy, dimension) {
            (IndexStrategy::Flat, Some(dimension)) if dimension > 0 => {
                let mut matrix = FlatMatrix {
                    dimension,
                    ..FlatMatrix::default()
                };
                for (position, entry) in entries.iter().enumerate() {
                    if entry.embedding.len() == dimension {
                        matrix.data.extend_from_slice(&entry.embedding);
                        matrix.rows.push(position);
                    }
                }
                Some(matrix)
            }
            _ => None,
        };

        Self {
            entries,
            dimension,
            flat,
        }
    }

    fn score_flat(&self, matrix: &FlatMatrix, query: &[f32]) -> Vec<Scored> {
        matrix
            .data
            .chunks_exact(matrix.dimension)
            .zip(&matrix.rows)
            .map(|(row, &position)| Scored {
                position,
                score: vector::dot(row, query),
            })
            .filter(|scored| !scored.score.is_nan())
            .collect()
    }

    fn score_brute_force(&self, query: &[f32]) -> Vec<Scored> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.embedding.len() == query.len())
            .map(|(position, entry)| Scored {
                position,
                score: vector::dot(&entry.embedding, query),
            })
            .filter(|scored| !scored.score.is_nan())
            .collect()
    }
}

/// Keep the best `k` candidates, ordered best first.
///
/// Uses a selection pass so only the `k` survivors are fully sorted.
fn top_k(mut scored: Vec<Scored>, k: usize) -> Vec<Scored> {
    if k == 0 || scored.is_empty() {
        return Vec::new();
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, rank);
        scored.truncate(k);
    }
    scored.sort_unstable_by(rank);
    scored
}

/// Thread-safe top-K similarity index with atomic snapshot replacement.
#[derive(Debug)]
pub struct SimilarityIndex {
    strategy: IndexStrategy,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new(IndexStrategy::default())
    }
}

impl SimilarityIndex {
    /// Create an empty index using `strategy`.
    pub fn new(strategy: IndexStrategy) -> Self {
        Self {
            strategy,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
        }
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the whole index with `entries`, keeping their order as insertion order.
    ///
    /// Returns the number of entries now indexed.
    pub fn build<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        let snapshot = IndexSnapshot::build(entries.into_iter().collect(), self.strategy);
        let len = snapshot.entries.len();
        tracing::debug!(
            "Built {} index snapshot with {} entries (dimension {:?})",
            self.strategy,
            len,
            snapshot.dimension
        );
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        len
    }

    /// The `k` most similar documents to `query`, best first.
    ///
    /// Returns an empty result for `k == 0`, an empty query, or an empty index.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 || query.is_empty() {
            return Vec::new();
        }

        let snapshot = self.current();
        if snapshot.entries.is_empty() {
            return Vec::new();
        }

        let query = vector::normalize(query);
        let scored = match &snapshot.flat {
            Some(matrix) if matrix.dimension == query.len() && !matrix.rows.is_empty() => {
                snapshot.score_flat(matrix, &query)
            }
            _ => snapshot.score_brute_force(&query),
        };

        top_k(scored, k)
            .into_iter()
            .map(|scored| SearchHit {
                document_id: snapshot.entries[scored.position].document_id,
                score: scored.score,
            })
            .collect()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the first indexed entry, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.current().dimension
    }
}
