//! Time-to-live caches for the three stages of a query.
//!
//! Each [`TtlCache`] wraps a `moka::sync::Cache` built with a fixed
//! `time_to_live` and an optional `max_capacity`, and counts its own hits and
//! misses. A lookup never returns an expired entry. Overwriting a key restarts
//! its lifetime. When a capacity is set, moka's admission and eviction policy
//! keeps the tier within it.
//!
//! [`TieredCache`] bundles the embedding, search-result and answer caches, all
//! keyed by [`cache_key`] so that questions differing only in case or
//! surrounding whitespace share entries.

use moka::sync::Cache;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default lifetime of cached question embeddings.
pub const DEFAULT_EMBEDDING_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Default lifetime of cached search results.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(30 * 60);
/// Default lifetime of cached answers.
pub const DEFAULT_ANSWER_TTL: Duration = Duration::from_secs(30 * 60);

/// Longest lifetime handed to moka, which rejects anything near 1000 years.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Normalize a question into the key shared by every cache tier.
pub fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hit/miss counters and current size of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A map whose entries expire a fixed time after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    ttl: Duration,
    inner: Cache<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self::build(ttl, 0)
    }

    /// Bound the number of live entries. A capacity of 0 means unbounded.
    pub fn with_capacity(self, capacity: usize) -> Self {
        Self::build(self.ttl, capacity)
    }

    fn build(ttl: Duration, capacity: usize) -> Self {
        let mut builder = Cache::builder();
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl.min(MAX_TTL));
        }
        if capacity > 0 {
            builder = builder.max_capacity(capacity as u64);
        }
        Self {
            ttl,
            inner: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`. Expired entries are never returned.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.inner.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key`, restarting its lifetime.
    ///
    /// With a zero lifetime nothing is stored.
    pub fn set(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.inner.insert(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        // apply pending evictions so the capacity bound is visible
        self.inner.run_pending_tasks();
        self.inner.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Lifetimes and size bound for a [`TieredCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub embedding_ttl: Duration,
    pub search_ttl: Duration,
    pub answer_ttl: Duration,
    /// Per-tier entry limit, 0 for unbounded
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            embedding_ttl: DEFAULT_EMBEDDING_TTL,
            search_ttl: DEFAULT_SEARCH_TTL,
            answer_ttl: DEFAULT_ANSWER_TTL,
            capacity: 0,
        }
    }
}

/// The embedding, search-result and answer caches of one query engine.
#[derive(Debug)]
pub struct TieredCache {
    pub embeddings: TtlCache<String, Vec<f32>>,
    pub search: TtlCache<String, Vec<String>>,
    pub answers: TtlCache<String, String>,
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl TieredCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            embeddings: TtlCache::new(settings.embedding_ttl).with_capacity(settings.capacity),
            search: TtlCache::new(settings.search_ttl).with_capacity(settings.capacity),
            answers: TtlCache::new(settings.answer_ttl).with_capacity(settings.capacity),
        }
    }

    /// Forget search results and answers, keeping question embeddings.
    ///
    /// Called whenever the corpus changes.
    pub fn invalidate_results(&self) {
        self.search.clear();
        self.answers.clear();
    }

    pub fn clear(&self) {
        self.embeddings.clear();
        self.invalidate_results();
    }
}
