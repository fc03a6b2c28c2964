//! Embed a few sentences through a local OpenAI-compatible server

use ragdoc_embed::{EmbedConfig, EmbeddingProvider, HttpEmbeddingProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let endpoint =
        std::env::var("RAGDOC_ENDPOINT").unwrap_or_else(|_| "http://localhost:1234".to_string());
    let config = EmbedConfig::http(endpoint, ragdoc_embed::DEFAULT_EMBEDDING_MODEL).with_batch_size(2);

    println!("Model: {}", config.model_name);
    println!("Endpoint: {}", config.embeddings_url());

    let provider = HttpEmbeddingProvider::new(config)?;

    let text = "Hello, this is a test sentence for embedding generation.";
    let embedding = provider.embed_text(text).await?;
    println!("\"{text}\" -> {} dimensions", embedding.len());

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "The Rise of the Jedis is a story about an order of knights.".to_string(),
        "Machine learning models process natural language.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    for (text, embedding) in texts.iter().zip(result.embeddings.iter()) {
        println!("\"{text}\" -> first values {:?}", &embedding[..3.min(embedding.len())]);
    }
    println!("Provider: {}", provider.provider_name());
    Ok(())
}
