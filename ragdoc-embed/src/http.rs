//! OpenAI-compatible HTTP embedding provider (LM Studio, llama.cpp server, OpenAI).

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{DimensionGuard, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Embedding provider that calls the `/v1/embeddings` route of an
/// OpenAI-compatible server.
///
/// The provider never retries; a non-success status becomes
/// [`EmbedError::Provider`] and a body without usable vectors becomes
/// [`EmbedError::MalformedResponse`].
#[derive(Debug)]
pub struct HttpEmbeddingProvider {
    client: Client,
    config: EmbedConfig,
    url: String,
    dimension: DimensionGuard,
}

impl HttpEmbeddingProvider {
    /// Builds the HTTP client from `config`.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = config.api_key.as_deref() {
            let auth = format!("Bearer {}", api_key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| EmbedError::invalid_config("API key is not a valid header value"))?,
            );
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;
        let url = config.embeddings_url();

        tracing::info!(
            "Created HTTP embedding provider for model {} at {}",
            config.model_name(),
            url
        );

        Ok(Self {
            client,
            config,
            url,
            dimension: DimensionGuard::new(),
        })
    }

    /// The configuration this provider was built from
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    async fn request_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model_name,
            input: inputs,
            dimensions: self.config.dimensions,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("Embedding request failed with {}: {}", status, body);
            return Err(EmbedError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        parse_embedding_response(&body, inputs.len())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = [text.to_string()];
        let mut embeddings = self.request_batch(&inputs).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| EmbedError::malformed("no embedding returned from API"))?;
        self.dimension.check(&embedding)?;
        Ok(embedding)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Requesting embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let embeddings = self.request_batch(batch).await?;
            for embedding in &embeddings {
                self.dimension.check(embedding)?;
            }
            all_embeddings.extend(embeddings);
        }
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.dimension.dimension()
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Decode an `/v1/embeddings` body into vectors ordered like the request inputs.
pub(crate) fn parse_embedding_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("invalid embedding payload: {e}")))?;

    if parsed.data.len() != expected {
        return Err(EmbedError::malformed(format!(
            "API returned {} embeddings for {} inputs",
            parsed.data.len(),
            expected
        )));
    }

    parsed.data.sort_by_key(|entry| entry.index);
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_orders_by_index() {
        let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let vectors = parse_embedding_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        let err = parse_embedding_response(r#"{"object":"list"}"#, 1).unwrap_err();
        assert!(matches!(err, EmbedError::MalformedResponse { .. }));

        let err = parse_embedding_response(r#"{"data":[]}"#, 1).unwrap_err();
        assert!(err.to_string().contains("0 embeddings for 1 inputs"));

        let err = parse_embedding_response("not json", 1).unwrap_err();
        assert!(matches!(err, EmbedError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_embed_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"model": "nomic", "input": ["hello"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.25, 0.5, 0.75], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let provider = HttpEmbeddingProvider::new(EmbedConfig::http(server.uri(), "nomic")).unwrap();

        let embedding = provider.embed_text("hello").await.unwrap();
        assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
        assert_eq!(provider.embedding_dimension(), Some(3));
    }

    #[tokio::test]
    async fn test_embed_texts_batches_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;
        let provider =
            HttpEmbeddingProvider::new(EmbedConfig::http(server.uri(), "nomic").with_batch_size(2))
                .unwrap();

        let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|t| t.to_string()).collect();
        let result = provider.embed_texts(&texts).await.unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.embeddings[0], vec![1.0, 0.0]);

        let requests = server.received_requests().await.unwrap();
        let first: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(first["input"], json!(["a", "b"]));
        let second: serde_json::Value = requests[1].body_json().unwrap();
        assert_eq!(second["input"], json!(["c", "d"]));
    }

    #[tokio::test]
    async fn test_embed_text_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"error":"boom"}"#))
            .mount(&server)
            .await;
        let provider = HttpEmbeddingProvider::new(EmbedConfig::http(server.uri(), "nomic")).unwrap();

        let err = provider.embed_text("hello").await.unwrap_err();
        match err {
            EmbedError::Provider { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.embedding_dimension(), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HttpEmbeddingProvider::new(EmbedConfig::http("ftp://nope", "nomic"));
        assert!(matches!(result, Err(EmbedError::InvalidConfig { .. })));
    }
}
