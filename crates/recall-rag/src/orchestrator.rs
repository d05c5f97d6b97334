//! Top-level retrieval facade.
//!
//! Drives the query-time pipeline (expand, hybrid search, rerank) and
//! assembles the final prompt context. Retrieval failures degrade to an
//! empty context rather than erroring: a missing knowledge augmentation
//! must never block the chat response that asked for it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::expander::QueryExpander;
use crate::reranker::{RerankedResult, Reranker};
use crate::search::HybridSearcher;

/// The retrieval outcome for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContext {
    pub retrieved_chunks: Vec<RerankedResult>,
    /// Ready-to-embed context block; empty when nothing relevant was found
    pub formatted_context: String,
    /// Token usage from query expansion
    pub total_tokens_used: u32,
}

impl RagContext {
    fn empty() -> Self {
        Self {
            retrieved_chunks: Vec::new(),
            formatted_context: String::new(),
            total_tokens_used: 0,
        }
    }
}

pub struct RagOrchestrator {
    config: RetrievalConfig,
    expander: QueryExpander,
    searcher: HybridSearcher,
    reranker: Reranker,
}

impl RagOrchestrator {
    pub fn new(
        config: RetrievalConfig,
        expander: QueryExpander,
        searcher: HybridSearcher,
        reranker: Reranker,
    ) -> Self {
        Self {
            config,
            expander,
            searcher,
            reranker,
        }
    }

    /// Run the full retrieval pipeline for a query.
    ///
    /// `top_k` and `similarity_threshold` override the configured defaults
    /// when given. Always returns a context; on embedding failure or when
    /// no candidate survives filtering the context is empty.
    pub async fn retrieve_context(
        &self,
        query: &str,
        user_id: &str,
        top_k: Option<usize>,
        similarity_threshold: Option<f32>,
    ) -> RagContext {
        let top_k = top_k.unwrap_or(self.config.top_k);
        let threshold = similarity_threshold.unwrap_or(self.config.similarity_threshold);

        let expanded = match self.expander.expand(query).await {
            Ok(expanded) => expanded,
            Err(e) => {
                warn!("query expansion failed, returning empty context: {}", e);
                return RagContext::empty();
            }
        };

        let candidates = self
            .searcher
            .search(user_id, query, &expanded.original_embedding, top_k)
            .await;
        debug!(candidates = candidates.len(), "hybrid search complete");

        let mut reranked = self.reranker.rerank(query, candidates, top_k).await;
        reranked.retain(|r| r.final_score >= threshold);

        if reranked.is_empty() {
            info!("no candidates above threshold, returning empty context");
            return RagContext {
                retrieved_chunks: Vec::new(),
                formatted_context: String::new(),
                total_tokens_used: expanded.total_tokens_used,
            };
        }

        let formatted_context = format_context(&reranked);
        info!(
            chunks = reranked.len(),
            tokens = expanded.total_tokens_used,
            "retrieved context"
        );

        RagContext {
            retrieved_chunks: reranked,
            formatted_context,
            total_tokens_used: expanded.total_tokens_used,
        }
    }

    /// Wrap a user prompt with the retrieved context.
    ///
    /// An empty context produces an explicit "nothing found" instruction so
    /// the completion provider does not invent citations.
    pub fn enhance_prompt_with_context(&self, original_prompt: &str, context: &RagContext) -> String {
        if context.formatted_context.trim().is_empty() {
            return format!(
                "No relevant notes were found in the knowledge base for this query. \
                 Answer from general knowledge and do not cite or reference any notes.\n\n\
                 USER QUERY: {}",
                original_prompt
            );
        }

        format!(
            "RETRIEVED NOTES FROM KNOWLEDGE BASE:\n\n{}\n\
             INSTRUCTIONS: Use the notes above to answer the query when they are \
             relevant. Cite a note by its [Note N] marker. Only cite notes that \
             appear above; never invent citations.\n\n\
             USER QUERY: {}",
            context.formatted_context, original_prompt
        )
    }
}

/// Render reranked chunks as labeled excerpts. Chunks from the same note
/// share a citation marker, assigned in order of first appearance.
fn format_context(chunks: &[RerankedResult]) -> String {
    let mut markers: HashMap<&str, usize> = HashMap::new();
    let mut next_marker = 1;
    let mut out = String::new();

    for chunk in chunks {
        let marker = *markers.entry(chunk.fused.note_id.as_str()).or_insert_with(|| {
            let m = next_marker;
            next_marker += 1;
            m
        });
        out.push_str(&format!(
            "[Note {}] (relevance: {:.2})\n{}\n\n",
            marker, chunk.relevance_score, chunk.fused.content
        ));
    }

    out
}
