//! Completion provider trait.
//!
//! The RAG pipeline uses completions for query expansion only: drafting a
//! hypothetical answer (HyDE) and paraphrasing the query. The chat/agent
//! layer that consumes the final context has its own completion plumbing.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A completion result with token usage for cost accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Total tokens consumed (prompt + completion) as reported by the API,
    /// or 0 if the backend does not report usage.
    pub tokens_used: u32,
}

/// Trait for completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the given prompt.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, ProviderError>;

    /// Registry name of this provider.
    fn provider_name(&self) -> &str;

    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Whether this provider is currently enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}
