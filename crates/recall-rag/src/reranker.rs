//! Second-pass reranking of fused search candidates.
//!
//! A relevance model scores each candidate against the query and the final
//! ordering blends that score with the fusion score. If the relevance
//! backend fails the candidates are re-expressed with their fusion scores
//! alone, so retrieval quality degrades but retrieval never fails here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use recall_providers::RelevanceScorer;

use crate::config::RerankConfig;
use crate::search::FusedResult;

/// A fused candidate after relevance rescoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedResult {
    #[serde(flatten)]
    pub fused: FusedResult,
    /// Relevance model score in [0, 1]
    pub relevance_score: f32,
    /// Blend of relevance and fusion scores; the final ordering key
    pub final_score: f32,
}

pub struct Reranker {
    config: RerankConfig,
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(config: RerankConfig, scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { config, scorer }
    }

    /// Rescore candidates and return the best `top_k`, sorted by
    /// `final_score` descending.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<FusedResult>,
        top_k: usize,
    ) -> Vec<RerankedResult> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();

        let mut results = match self.scorer.score(query, &texts).await {
            Ok(scores) if scores.len() == candidates.len() => candidates
                .into_iter()
                .zip(scores)
                .map(|(fused, relevance_score)| {
                    let final_score = self.config.relevance_weight * relevance_score
                        + self.config.rrf_weight * fused.rrf_score;
                    RerankedResult {
                        fused,
                        relevance_score,
                        final_score,
                    }
                })
                .collect(),
            Ok(scores) => {
                warn!(
                    expected = texts.len(),
                    got = scores.len(),
                    "relevance scorer returned wrong arity, using fusion-only ranking"
                );
                fusion_only(candidates)
            }
            Err(e) => {
                warn!("relevance scoring failed, using fusion-only ranking: {}", e);
                fusion_only(candidates)
            }
        };

        results.sort_by(|a: &RerankedResult, b: &RerankedResult| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(min_score) = self.config.min_score {
            results.retain(|r| r.final_score >= min_score);
        }

        results.truncate(top_k);
        debug!(kept = results.len(), "reranked candidates");
        results
    }
}

/// Degraded path: carry the fusion score through both score fields.
fn fusion_only(candidates: Vec<FusedResult>) -> Vec<RerankedResult> {
    candidates
        .into_iter()
        .map(|fused| RerankedResult {
            relevance_score: fused.rrf_score,
            final_score: fused.rrf_score,
            fused,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recall_providers::ProviderError;

    struct FixedScorer {
        scores: Option<Vec<f32>>,
    }

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, ProviderError> {
            match &self.scores {
                Some(scores) => Ok(scores.iter().cloned().cycle().take(texts.len()).collect()),
                None => Err(ProviderError::Api("scorer down".to_string())),
            }
        }
    }

    fn candidate(id: &str, rrf_score: f32) -> FusedResult {
        FusedResult {
            id: id.to_string(),
            note_id: format!("note-{}", id),
            content: format!("content {}", id),
            vector_score: 0.5,
            lexical_score: 0.5,
            vector_rank: 1,
            lexical_rank: 1,
            rrf_score,
            found_by_vector: true,
            found_by_lexical: true,
        }
    }

    fn reranker(scores: Option<Vec<f32>>) -> Reranker {
        Reranker::new(RerankConfig::default(), Arc::new(FixedScorer { scores }))
    }

    #[tokio::test]
    async fn test_rerank_orders_by_final_score() {
        // Fusion ranks a above b but the relevance model disagrees hard
        // enough to flip them.
        let r = reranker(Some(vec![0.1, 0.9]));
        let results = r
            .rerank("query", vec![candidate("a", 0.02), candidate("b", 0.01)], 10)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fused.id, "b");
        assert!((results[0].relevance_score - 0.9).abs() < f32::EPSILON);
        let expected = 0.7 * 0.9 + 0.3 * 0.01;
        assert!((results[0].final_score - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_top_k() {
        let r = reranker(Some(vec![0.5]));
        let candidates = (0..10).map(|i| candidate(&i.to_string(), 0.01)).collect();
        let results = r.rerank("query", candidates, 3).await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_rerank_min_score_filter() {
        let r = Reranker::new(
            RerankConfig {
                min_score: Some(0.5),
                ..RerankConfig::default()
            },
            Arc::new(FixedScorer {
                scores: Some(vec![0.9, 0.1]),
            }),
        );

        let results = r
            .rerank("query", vec![candidate("a", 0.01), candidate("b", 0.01)], 10)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fused.id, "a");
    }

    #[tokio::test]
    async fn test_scorer_failure_degrades_to_fusion_ranking() {
        let r = reranker(None);
        let results = r
            .rerank("query", vec![candidate("a", 0.02), candidate("b", 0.01)], 10)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fused.id, "a");
        for result in &results {
            assert!((result.relevance_score - result.fused.rrf_score).abs() < f32::EPSILON);
            assert!((result.final_score - result.fused.rrf_score).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn test_wrong_arity_degrades_to_fusion_ranking() {
        struct ShortScorer;

        #[async_trait]
        impl RelevanceScorer for ShortScorer {
            async fn score(
                &self,
                _query: &str,
                _texts: &[String],
            ) -> Result<Vec<f32>, ProviderError> {
                Ok(vec![0.5])
            }
        }

        let r = Reranker::new(RerankConfig::default(), Arc::new(ShortScorer));
        let results = r
            .rerank("query", vec![candidate("a", 0.02), candidate("b", 0.01)], 10)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fused.id, "a");
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let r = reranker(Some(vec![0.5]));
        assert!(r.rerank("query", Vec::new(), 5).await.is_empty());
    }
}
