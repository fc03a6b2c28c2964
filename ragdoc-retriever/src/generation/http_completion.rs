//! OpenAI-compatible chat completion provider (LM Studio and friends).

use super::{CompletionError, CompletionProvider};
use async_trait::async_trait;
use ragdoc_context::DEFAULT_SYSTEM_PROMPT;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`HttpCompletionProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    /// Server base URL, without the `/v1/...` route
    pub endpoint_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
    pub system_prompt: String,
    pub api_key: Option<String>,
}

impl CompletionConfig {
    pub fn new(endpoint_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model: model.into(),
            temperature: 0.5,
            max_tokens: 500,
            timeout: Duration::from_secs(600),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key: None,
        }
    }

    /// Full URL of the chat completions route.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.endpoint_url.trim_end_matches('/')
        )
    }
}

/// Calls `/v1/chat/completions` with the configured system prompt and the
/// assembled prompt as the user message. Never retries.
#[derive(Debug)]
pub struct HttpCompletionProvider {
    client: Client,
    config: CompletionConfig,
    url: String,
}

impl HttpCompletionProvider {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = config.api_key.as_deref() {
            let auth = format!("Bearer {}", api_key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| CompletionError::malformed("API key is not a valid header value"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        let url = config.completions_url();

        Ok(Self {
            client,
            config,
            url,
        })
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        tracing::debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.url,
            prompt.len()
        );
        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion_response(&body)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's trimmed text from a chat completions body.
pub(crate) fn parse_completion_response(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::malformed(format!("invalid completion payload: {e}")))?;

    let answer = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if answer.is_empty() {
        return Err(CompletionError::EmptyResponse);
    }
    Ok(answer)
}
