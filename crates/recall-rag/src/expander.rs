//! Query expansion: HyDE and multi-query paraphrasing.
//!
//! Retrieval recall improves when the query is represented more than one
//! way. HyDE embeds a synthetic ideal answer instead of the raw question,
//! which matches answer-shaped chunks better; multi-query embeds a few
//! paraphrases to cover wording variance. Both are optional and both
//! degrade to the plain query embedding on any failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use recall_providers::{CompletionProvider, EmbeddingProvider};

use crate::chunker::estimate_tokens;
use crate::config::ExpansionConfig;
use crate::error::RagError;

/// How a query variant was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKind {
    /// Hypothetical-document embedding (synthetic ideal answer)
    Hyde,
    /// LLM-generated rephrasing of the original query
    Paraphrase,
}

/// A generated query variant and its embedding.
#[derive(Debug, Clone)]
pub struct QueryVariant {
    pub kind: VariantKind,
    pub text: String,
    pub vector: Vec<f32>,
}

/// The result of expanding a query.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub original_query: String,
    pub original_embedding: Vec<f32>,
    pub expanded_embeddings: Vec<QueryVariant>,
    /// Aggregate token usage across the original embedding, variant
    /// generation and variant embeddings.
    pub total_tokens_used: u32,
}

pub struct QueryExpander {
    config: ExpansionConfig,
    embeddings: Arc<dyn EmbeddingProvider>,
    completions: Arc<dyn CompletionProvider>,
}

impl QueryExpander {
    pub fn new(
        config: ExpansionConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        completions: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            embeddings,
            completions,
        }
    }

    /// Expand a query into one or more embeddings.
    ///
    /// The original query's embedding is always computed and its failure is
    /// the only failure this method propagates. Variant generation and
    /// variant embedding failures are logged and skipped.
    pub async fn expand(&self, query: &str) -> Result<ExpandedQuery, RagError> {
        let original_embedding = self.embeddings.generate_embedding(query).await?;
        let mut total_tokens_used = estimate_tokens(query) as u32;
        let mut variants = Vec::new();

        if self.config.enable_hyde {
            match self.generate_variant(VariantKind::Hyde, query).await {
                Ok((variant, tokens)) => {
                    total_tokens_used += tokens;
                    variants.push(variant);
                }
                Err(e) => warn!("HyDE variant failed, skipping: {}", e),
            }
        }

        if self.config.enable_multi_query && self.config.num_variants > 0 {
            match self.generate_paraphrases(query).await {
                Ok((mut paraphrases, tokens)) => {
                    total_tokens_used += tokens;
                    variants.append(&mut paraphrases);
                }
                Err(e) => warn!("multi-query expansion failed, skipping: {}", e),
            }
        }

        debug!(
            variants = variants.len(),
            tokens = total_tokens_used,
            "expanded query"
        );

        Ok(ExpandedQuery {
            original_query: query.to_string(),
            original_embedding,
            expanded_embeddings: variants,
            total_tokens_used,
        })
    }

    async fn generate_variant(
        &self,
        kind: VariantKind,
        query: &str,
    ) -> Result<(QueryVariant, u32), RagError> {
        let prompt = format!(
            "Write a short passage that directly answers the following question, \
             as if quoting from a personal note on the topic. \
             Respond with the passage only.\n\nQuestion: {}",
            query
        );

        let completion = self
            .completions
            .complete(&prompt, self.config.max_variant_tokens)
            .await?;
        let text = completion.text.trim().to_string();
        if text.is_empty() {
            return Err(RagError::Validation(
                "completion returned an empty variant".to_string(),
            ));
        }

        let vector = self.embeddings.generate_embedding(&text).await?;
        let tokens = completion.tokens_used + estimate_tokens(&text) as u32;

        Ok((QueryVariant { kind, text, vector }, tokens))
    }

    async fn generate_paraphrases(
        &self,
        query: &str,
    ) -> Result<(Vec<QueryVariant>, u32), RagError> {
        let prompt = format!(
            "Rephrase the following search query {} different ways, keeping the \
             meaning identical. Respond with one rephrasing per line, no numbering.\n\n\
             Query: {}",
            self.config.num_variants, query
        );

        let completion = self
            .completions
            .complete(&prompt, self.config.max_variant_tokens)
            .await?;
        let mut total_tokens = completion.tokens_used;

        let texts: Vec<String> = completion
            .text
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
                    .trim()
                    .to_string()
            })
            .filter(|line| !line.is_empty())
            .take(self.config.num_variants)
            .collect();

        let mut variants = Vec::with_capacity(texts.len());
        for text in texts {
            match self.embeddings.generate_embedding(&text).await {
                Ok(vector) => {
                    total_tokens += estimate_tokens(&text) as u32;
                    variants.push(QueryVariant {
                        kind: VariantKind::Paraphrase,
                        text,
                        vector,
                    });
                }
                Err(e) => warn!("failed to embed paraphrase, skipping: {}", e),
            }
        }

        Ok((variants, total_tokens))
    }
}
