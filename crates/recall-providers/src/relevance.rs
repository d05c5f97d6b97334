//! Relevance scoring for the reranking stage.
//!
//! Scores each candidate against the query on a 0-10 scale via a chat
//! completion, normalized to [0, 1]. Works with LM Studio, Ollama and any
//! OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Score assigned when a single judgment cannot be parsed. Neutral enough
/// that the candidate is neither promoted nor filtered outright.
const FALLBACK_SCORE: f32 = 0.5;

/// Trait for relevance-scoring backends (cross-encoder-style models or
/// heuristics; opaque to the reranker).
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score each candidate text against the query. Returns one score in
    /// [0, 1] per input text, in input order.
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ProviderError>;
}

/// Chat completions-based relevance scorer.
///
/// Prompts the model to rate query/document relevance 0-10 and parses the
/// first number in the reply. Documents are processed sequentially: local
/// LLM servers run one inference at a time, and parallel requests cause
/// channel errors.
pub struct ChatRelevanceScorer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatRelevanceScorer {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            api_key,
        }
    }

    /// Parse a 0-10 rating out of a model reply, normalized to [0, 1].
    /// Handles replies wrapped in `<think>` tags.
    fn parse_score(response: &str) -> Option<f32> {
        let cleaned = response.split("</think>").last().unwrap_or(response).trim();

        let number: String = cleaned
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        number
            .parse::<f32>()
            .ok()
            .map(|n| (n / 10.0).clamp(0.0, 1.0))
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
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl RelevanceScorer for ChatRelevanceScorer {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let mut scores = Vec::with_capacity(texts.len());

        for text in texts {
            let excerpt: String = text.chars().take(2000).collect();

            let request = ChatCompletionRequest {
                model: self.model.clone(),
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: "Rate how relevant the Document is to the Query on a scale \
                                  from 0 (unrelated) to 10 (directly answers it). Reply with \
                                  only the number."
                            .to_string(),
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: format!("<Query>: {}\n<Document>: {}", query, excerpt),
                    },
                ],
                max_tokens: 10,
                temperature: 0.0,
            };

            let mut req_builder = self.client.post(&url).json(&request);
            if let Some(key) = &self.api_key {
                req_builder = req_builder.bearer_auth(key);
            }

            let response = req_builder
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let score = match response.json::<ChatCompletionResponse>().await {
                Ok(completion) => completion
                    .choices
                    .first()
                    .and_then(|c| Self::parse_score(&c.message.content))
                    .unwrap_or_else(|| {
                        warn!("Unparseable relevance judgment, using fallback score");
                        FALLBACK_SCORE
                    }),
                Err(e) => {
                    warn!(error = %e, "Failed to parse relevance response");
                    FALLBACK_SCORE
                }
            };

            debug!(score, "Relevance judgment");
            scores.push(score);
        }

        Ok(scores)
    }
}
