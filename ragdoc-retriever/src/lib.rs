//! ragdoc-retriever: retrieval-augmented question answering over stored documents
//!
//! Documents are embedded once at ingest and kept in a document store. At query
//! time the question is embedded, the closest documents are found in an
//! in-memory similarity index, the passages are budgeted into a prompt, and a
//! language model writes the answer. Each stage is cached.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: query engine, similarity index, caches and ingest
//! - **[`storage`]**: document store trait with SQLite and in-memory backends
//! - **[`generation`]**: completion provider trait and OpenAI-compatible client
//! - **[`vector`]**: normalization, cosine similarity and the embedding byte codec
//! - **[`config`]**: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ragdoc_embed::HttpEmbeddingProvider;
//! use ragdoc_retriever::config::RagConfig;
//! use ragdoc_retriever::generation::HttpCompletionProvider;
//! use ragdoc_retriever::retrieval::QueryEngine;
//! use ragdoc_retriever::storage::SqliteStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RagConfig::load(Path::new("ragdoc.toml"))?;
//! let engine = QueryEngine::start(
//!     Arc::new(SqliteStore::open(Path::new(".")).await?),
//!     Arc::new(HttpEmbeddingProvider::new(config.embed_config())?),
//!     Arc::new(HttpCompletionProvider::new(config.completion_config())?),
//!     config.engine_settings(),
//! )
//! .await?;
//!
//! engine.ingest("Luke Skywalker is a Jedi.", None).await?;
//! println!("{}", engine.query("Who is Luke?").await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! add ─▶ Ingestor ─▶ EmbeddingProvider ─▶ DocumentStore
//!                                            │ rebuild
//!                                            ▼
//! query ─▶ TieredCache ─▶ SimilarityIndex ─▶ ContextBudgeter ─▶ CompletionProvider
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod retrieval;
pub mod storage;
pub mod vector;

pub use error::{Result, RetrieverError};
