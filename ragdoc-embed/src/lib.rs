//! # ragdoc-embed
//!
//! Embedding providers for ragdoc: turn text into fixed-dimension `f32`
//! vectors, either by calling an OpenAI-compatible HTTP endpoint or by running
//! an ONNX model locally through FastEmbed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ragdoc_embed::{EmbedConfig, EmbeddingProvider, HttpEmbeddingProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = HttpEmbeddingProvider::new(EmbedConfig::http(
//!     "http://localhost:1234",
//!     "text-embedding-nomic-embed-text-v1.5",
//! ))?;
//!
//! let embedding = provider.embed_text("What is the story about?").await?;
//! println!("dimension {}", embedding.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: provider configuration
//! - [`provider`]: the [`EmbeddingProvider`] trait, dimension tracking and the
//!   local FastEmbed provider
//! - [`http`]: the OpenAI-compatible HTTP provider
//! - [`error`]: error types and result handling
//!
//! ## Dimensions
//!
//! Every provider learns its embedding dimension from the first vector it
//! produces. A later vector of a different length is reported as
//! [`EmbedError::DimensionMismatch`] instead of being handed to callers.

pub mod config;
pub mod error;
pub mod http;
pub mod provider;

pub use config::{DEFAULT_EMBEDDING_MODEL, DEFAULT_ENDPOINT_URL, EmbedConfig, EmbedConfigBuilder};
pub use error::{EmbedError, Result};
pub use http::HttpEmbeddingProvider;
pub use provider::{DimensionGuard, EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
