pub mod cache;
pub mod ingest;
pub mod query_engine;
pub mod similarity_index;

pub use cache::{CacheSettings, CacheStats, TieredCache, TtlCache, cache_key};
pub use ingest::{IndexRefresh, IngestOutcome, Ingestor};
pub use query_engine::{EngineSettings, EngineStats, NO_RELEVANT_INFORMATION, QueryEngine};
pub use similarity_index::{IndexEntry, IndexStrategy, SearchHit, SimilarityIndex};
