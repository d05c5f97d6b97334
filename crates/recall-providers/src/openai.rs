//! OpenAI-compatible HTTP providers.
//!
//! Both clients speak the de-facto standard `/v1/embeddings` and
//! `/v1/chat/completions` shapes, so they also work against OpenRouter,
//! LM Studio, Ollama and similar gateways.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{Completion, CompletionProvider};
use crate::embedding::EmbeddingProvider;
use crate::error::ProviderError;

const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI-compatible embedding provider.
pub struct OpenAiEmbeddings {
    api_key: String,
    model: String,
    dimensions: usize,
    enabled: bool,
    client: Client,
    base_url: String,
}

impl OpenAiEmbeddings {
    /// Create a provider with default model settings
    /// (text-embedding-3-small, 1536 dimensions).
    pub fn new(api_key: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimensions: dimensions.unwrap_or(crate::DEFAULT_DIMENSIONS),
            enabled: true,
            client: Client::new(),
            base_url: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }

    /// Set a custom base URL (proxies, OpenRouter, local gateways, tests).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Mark the provider enabled or disabled. A disabled provider rejects
    /// every call with [`ProviderError::Disabled`].
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Send an embedding request with retry on 429.
    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request_body = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.clone(),
        };

        let mut retry_count = 0;
        let mut backoff_secs = 1u64;

        loop {
            debug!(
                "Sending embedding request for {} texts to {}",
                texts.len(),
                self.base_url
            );

            let response = self
                .client
                .post(&self.base_url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let status = response.status();

            if status.is_success() {
                let embedding_response: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

                if embedding_response.data.len() != texts.len() {
                    return Err(ProviderError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        texts.len(),
                        embedding_response.data.len()
                    )));
                }

                // Sort by index to guarantee input order
                let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
                    .data
                    .into_iter()
                    .map(|d| (d.index, d.embedding))
                    .collect();
                embeddings.sort_by_key(|(idx, _)| *idx);

                return Ok(embeddings.into_iter().map(|(_, emb)| emb).collect());
            }

            if status.as_u16() == 429 {
                retry_count += 1;
                if retry_count > MAX_RETRIES {
                    return Err(ProviderError::RateLimited(MAX_RETRIES));
                }

                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                warn!(
                    "Rate limited, retrying after {} seconds (attempt {}/{})",
                    retry_after, retry_count, MAX_RETRIES
                );

                tokio::time::sleep(tokio::time::Duration::from_secs(retry_after)).await;
                backoff_secs *= 2;
                continue;
            }

            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::Api(format!(
                "status {}: {}",
                status.as_u16(),
                error_body
            )));
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embeddings = self.generate_embeddings(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::Disabled(self.provider_name().to_string()));
        }
        if texts.is_empty() || texts.iter().all(|t| t.trim().is_empty()) {
            return Err(ProviderError::EmptyInput);
        }

        debug!("Embedding batch of {} texts", texts.len());
        self.send_request(texts.to_vec()).await
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn max_batch_size(&self) -> usize {
        32
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAiCompletions {
    api_key: String,
    model: String,
    enabled: bool,
    temperature: f32,
    client: Client,
    base_url: String,
}

impl OpenAiCompletions {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            enabled: true,
            temperature: 0.7,
            client: Client::new(),
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::Disabled(self.provider_name().to_string()));
        }
        if prompt.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::Api(format!(
                "status {}: {}",
                status.as_u16(),
                error_body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".to_string()))?;

        Ok(Completion {
            text,
            tokens_used: completion.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
