//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::ProviderError;

/// Trait for embedding backends.
///
/// Implementations must be `Send + Sync` so they can be shared across the
/// async pipeline behind an `Arc`. Disabled providers and empty input are
/// reported as [`ProviderError`] results, never panics; the query-time
/// pipeline treats any error here as "no augmentation", not a failure of the
/// surrounding chat flow.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed multiple texts in a batch. The output order matches the input.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Registry name of this provider (e.g. "openai").
    fn provider_name(&self) -> &str;

    /// Model identifier reported to stored embeddings.
    fn model_name(&self) -> &str;

    /// Dimensionality of every vector this provider produces. Stored
    /// embeddings carry this value as a partition key; a query vector is
    /// only ever compared against embeddings with matching dimensions.
    fn dimensions(&self) -> usize;

    /// Whether this provider is currently enabled.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Maximum number of texts per batch request.
    fn max_batch_size(&self) -> usize {
        32
    }
}
