//! Ask questions about a small corpus through a local LM Studio server
//!
//! This example shows the full pipeline:
//! 1. Opening a SQLite document store in a temporary directory
//! 2. Ingesting a few documents through the HTTP embedding provider
//! 3. Answering questions, the second time from the answer cache
//!
//! Set RAGDOC_ENDPOINT to point at a server other than http://localhost:1234.

use anyhow::Result;
use ragdoc_embed::HttpEmbeddingProvider;
use ragdoc_retriever::config::RagConfig;
use ragdoc_retriever::generation::HttpCompletionProvider;
use ragdoc_retriever::retrieval::QueryEngine;
use ragdoc_retriever::storage::SqliteStore;
use std::sync::Arc;
use std::time::Instant;
use tempfile::tempdir;

const DOCUMENTS: [&str; 3] = [
    "The Rise of the Jedis is a story about an order of knights who learn to wield the Force.",
    "Han Solo and Chewbacca fly the Millennium Falcon on smuggling runs across the galaxy.",
    "The Death Star is a moon-sized battle station able to destroy an entire planet.",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = RagConfig::default();
    if let Ok(endpoint) = std::env::var("RAGDOC_ENDPOINT") {
        config.endpoint_url = endpoint;
    }

    let temp_dir = tempdir()?;
    let engine = QueryEngine::start(
        Arc::new(SqliteStore::open(temp_dir.path()).await?),
        Arc::new(HttpEmbeddingProvider::new(config.embed_config())?),
        Arc::new(HttpCompletionProvider::new(config.completion_config())?),
        config.engine_settings(),
    )
    .await?;

    let outcomes = engine
        .ingest_batch(DOCUMENTS.iter().map(|d| (d.to_string(), None)).collect())
        .await?;
    println!("Ingested {} documents\n", outcomes.len());

    for question in ["What is the story about?", "  what is the STORY about? "] {
        let started = Instant::now();
        let answer = engine.query(question).await?;
        println!("Q: {}", question.trim());
        println!("A: {answer}");
        println!("   ({:.2?})\n", started.elapsed());
    }

    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    Ok(())
}
