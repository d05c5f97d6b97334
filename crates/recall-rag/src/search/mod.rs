//! Hybrid search combining vector similarity and BM25.
//!
//! This module retrieves candidate chunks from the vector and lexical
//! branches and fuses the two rankings with Reciprocal Rank Fusion (RRF).

pub mod bm25;

pub use bm25::Bm25Index;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::RagError;
use crate::store::{LexicalHit, LexicalIndex, VectorIndex};
use crate::types::NoteEmbedding;

/// Rank assigned to a chunk in a branch that did not return it. Large
/// enough that its reciprocal contribution is effectively zero.
pub const RANK_SENTINEL: usize = 10_000;

/// A candidate chunk after rank fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    /// Unique ID of the chunk embedding
    pub id: String,
    /// ID of the note the chunk came from
    pub note_id: String,
    /// The chunk text
    pub content: String,
    /// Cosine similarity from the vector branch (0 if not found there)
    pub vector_score: f32,
    /// BM25 score from the lexical branch (0 if not found there)
    pub lexical_score: f32,
    /// 1-based rank within the vector branch, or [`RANK_SENTINEL`]
    pub vector_rank: usize,
    /// 1-based rank within the lexical branch, or [`RANK_SENTINEL`]
    pub lexical_rank: usize,
    /// Weighted reciprocal-rank-fusion score
    pub rrf_score: f32,
    pub found_by_vector: bool,
    pub found_by_lexical: bool,
}

/// Sanitize a raw query for the lexical branch: keep alphanumerics,
/// whitespace, `-` and `_`; collapse whitespace runs; trim.
pub fn sanitize_query(query: &str) -> String {
    let kept: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hybrid searcher over a vector index and a lexical index.
///
/// Branch failures are recovered locally: a failed branch contributes an
/// empty candidate list and the other branch carries the ranking alone.
pub struct HybridSearcher {
    config: SearchConfig,
    vector_index: Arc<dyn VectorIndex>,
    lexical_index: Arc<dyn LexicalIndex>,
}

impl HybridSearcher {
    pub fn new(
        config: SearchConfig,
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
    ) -> Self {
        Self {
            config,
            vector_index,
            lexical_index,
        }
    }

    /// Retrieve and fuse candidates for a query.
    ///
    /// The caller supplies the query embedding so that one embedding call
    /// can serve expansion and search.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Vec<FusedResult> {
        let initial_k = self.config.initial_k.max(top_k);

        let vector_hits = match self
            .vector_index
            .search_nearest(user_id, query_vector, query_vector.len(), initial_k)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!("vector search failed, continuing lexical-only: {}", e);
                Vec::new()
            }
        };

        let sanitized = sanitize_query(query);
        let lexical_hits = if sanitized.is_empty() {
            debug!("query sanitized to empty, skipping lexical branch");
            Vec::new()
        } else {
            match self
                .lexical_index
                .search_ranked(user_id, &sanitized, initial_k)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("lexical search failed, continuing vector-only: {}", e);
                    Vec::new()
                }
            }
        };

        debug!(
            vector_candidates = vector_hits.len(),
            lexical_candidates = lexical_hits.len(),
            "fusing search branches"
        );

        let mut fused = fuse(
            &vector_hits,
            &lexical_hits,
            self.config.rrf_k,
            self.config.vector_weight,
            self.config.lexical_weight,
        );
        fused.truncate(top_k);
        fused
    }
}

/// Full outer union of the two branch rankings, scored by weighted RRF.
///
/// Every id that appears in either branch appears exactly once in the
/// output. Sorting is stable with the union built vector-branch-first, so
/// ties resolve toward the vector branch's ordering.
fn fuse(
    vector_hits: &[crate::store::VectorHit],
    lexical_hits: &[LexicalHit],
    rrf_k: f32,
    vector_weight: f32,
    lexical_weight: f32,
) -> Vec<FusedResult> {
    let mut results: Vec<FusedResult> = Vec::with_capacity(vector_hits.len() + lexical_hits.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (i, hit) in vector_hits.iter().enumerate() {
        positions.insert(hit.id.clone(), results.len());
        results.push(FusedResult {
            id: hit.id.clone(),
            note_id: hit.note_id.clone(),
            content: hit.content.clone(),
            vector_score: hit.score,
            lexical_score: 0.0,
            vector_rank: i + 1,
            lexical_rank: RANK_SENTINEL,
            rrf_score: 0.0,
            found_by_vector: true,
            found_by_lexical: false,
        });
    }

    for (i, hit) in lexical_hits.iter().enumerate() {
        match positions.get(&hit.id) {
            Some(&pos) => {
                let entry = &mut results[pos];
                entry.lexical_score = hit.score;
                entry.lexical_rank = i + 1;
                entry.found_by_lexical = true;
            }
            None => {
                positions.insert(hit.id.clone(), results.len());
                results.push(FusedResult {
                    id: hit.id.clone(),
                    note_id: hit.note_id.clone(),
                    content: hit.content.clone(),
                    vector_score: 0.0,
                    lexical_score: hit.score,
                    vector_rank: RANK_SENTINEL,
                    lexical_rank: i + 1,
                    rrf_score: 0.0,
                    found_by_vector: false,
                    found_by_lexical: true,
                });
            }
        }
    }

    for result in &mut results {
        result.rrf_score = vector_weight / (rrf_k + result.vector_rank as f32)
            + lexical_weight / (rrf_k + result.lexical_rank as f32);
    }

    // sort_by is stable, preserving the vector-first union order on ties
    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

struct DocMeta {
    user_id: String,
    note_id: String,
    content: String,
}

#[derive(Default)]
struct LexicalState {
    indexes: HashMap<String, Bm25Index>,
    docs: HashMap<String, DocMeta>,
}

/// In-memory lexical index: one BM25 index per user.
#[derive(Default)]
pub struct MemoryLexicalIndex {
    state: RwLock<LexicalState>,
}

impl MemoryLexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LexicalIndex for MemoryLexicalIndex {
    async fn index_chunk(&self, embedding: &NoteEmbedding) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        state
            .indexes
            .entry(embedding.user_id.clone())
            .or_default()
            .add_document(embedding.id.clone(), &embedding.lexical_content);
        state.docs.insert(
            embedding.id.clone(),
            DocMeta {
                user_id: embedding.user_id.clone(),
                note_id: embedding.note_id.clone(),
                content: embedding.content.clone(),
            },
        );
        Ok(())
    }

    async fn delete_by_note_id(&self, note_id: &str) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        let doomed: Vec<(String, String)> = state
            .docs
            .iter()
            .filter(|(_, meta)| meta.note_id == note_id)
            .map(|(id, meta)| (id.clone(), meta.user_id.clone()))
            .collect();

        for (id, user_id) in doomed {
            if let Some(index) = state.indexes.get_mut(&user_id) {
                index.remove_document(&id);
            }
            state.docs.remove(&id);
        }
        Ok(())
    }

    async fn search_ranked(
        &self,
        user_id: &str,
        sanitized_query: &str,
        k: usize,
    ) -> Result<Vec<LexicalHit>, RagError> {
        let state = self.state.read().await;
        let index = match state.indexes.get(user_id) {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        Ok(index
            .search(sanitized_query, k)
            .into_iter()
            .filter_map(|(id, score)| {
                state.docs.get(&id).map(|meta| LexicalHit {
                    id,
                    note_id: meta.note_id.clone(),
                    content: meta.content.clone(),
                    score: score as f32,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVectorIndex;
    use crate::store::VectorHit;

    fn vhit(id: &str, note_id: &str, score: f32) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            note_id: note_id.to_string(),
            content: format!("content {}", id),
            score,
        }
    }

    fn lhit(id: &str, note_id: &str, score: f32) -> LexicalHit {
        LexicalHit {
            id: id.to_string(),
            note_id: note_id.to_string(),
            content: format!("content {}", id),
            score,
        }
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("hello world"), "hello world");
        assert_eq!(sanitize_query("  what's   rust?!  "), "what s rust");
        assert_eq!(
            sanitize_query("well-known snake_case"),
            "well-known snake_case"
        );
        assert_eq!(sanitize_query("?!().,;"), "");
        assert_eq!(sanitize_query(""), "");
    }

    #[test]
    fn test_fuse_union_completeness() {
        let vector = vec![vhit("a", "n1", 0.9), vhit("b", "n2", 0.8)];
        let lexical = vec![lhit("b", "n2", 5.0), lhit("c", "n3", 4.0)];

        let fused = fuse(&vector, &lexical, 60.0, 0.7, 0.3);
        assert_eq!(fused.len(), 3);

        let ids: Vec<&str> = fused.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));
    }

    #[test]
    fn test_fuse_both_branches_outrank_single() {
        // Vector ranks {a:1, b:2}, lexical ranks {b:1, c:2}. The chunk
        // found by both branches must come out on top.
        let vector = vec![vhit("a", "n1", 0.9), vhit("b", "n2", 0.8)];
        let lexical = vec![lhit("b", "n2", 5.0), lhit("c", "n3", 4.0)];

        let fused = fuse(&vector, &lexical, 60.0, 0.7, 0.3);
        assert_eq!(fused[0].id, "b");
        assert!(fused[0].rrf_score > fused[1].rrf_score);

        let b = &fused[0];
        assert!(b.found_by_vector && b.found_by_lexical);
        assert_eq!(b.vector_rank, 2);
        assert_eq!(b.lexical_rank, 1);
        let expected = 0.7 / 62.0 + 0.3 / 61.0;
        assert!((b.rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_missing_branch_uses_sentinel() {
        let vector = vec![vhit("a", "n1", 0.9)];
        let lexical = vec![lhit("c", "n3", 4.0)];

        let fused = fuse(&vector, &lexical, 60.0, 0.7, 0.3);
        let a = fused.iter().find(|r| r.id == "a").unwrap();
        assert_eq!(a.lexical_rank, RANK_SENTINEL);
        assert!(!a.found_by_lexical);
        let c = fused.iter().find(|r| r.id == "c").unwrap();
        assert_eq!(c.vector_rank, RANK_SENTINEL);
        assert!(!c.found_by_vector);
    }

    #[test]
    fn test_fuse_score_bounds() {
        let vector: Vec<VectorHit> = (0..10).map(|i| vhit(&format!("v{}", i), "n", 0.5)).collect();
        let lexical: Vec<LexicalHit> =
            (0..10).map(|i| lhit(&format!("v{}", i), "n", 1.0)).collect();

        for result in fuse(&vector, &lexical, 60.0, 0.7, 0.3) {
            assert!(result.rrf_score >= 0.0);
            assert!(result.rrf_score <= 0.7 + 0.3);
        }
    }

    #[test]
    fn test_fuse_vector_only_preserves_order() {
        let vector = vec![vhit("a", "n1", 0.9), vhit("b", "n2", 0.8), vhit("c", "n3", 0.7)];
        let fused = fuse(&vector, &[], 60.0, 0.7, 0.3);

        let ids: Vec<&str> = fused.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fuse_empty_inputs() {
        assert!(fuse(&[], &[], 60.0, 0.7, 0.3).is_empty());
    }

    #[test]
    fn test_fuse_tie_break_prefers_vector_order() {
        // Equal weights, mirrored ranks: a and b tie exactly. The stable
        // sort must keep the vector-first union order (a before b).
        let vector = vec![vhit("a", "n1", 0.9), vhit("b", "n2", 0.8)];
        let lexical = vec![lhit("b", "n2", 5.0), lhit("a", "n1", 4.0)];

        let fused = fuse(&vector, &lexical, 60.0, 0.5, 0.5);
        assert!((fused[0].rrf_score - fused[1].rrf_score).abs() < f32::EPSILON);
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[1].id, "b");
    }

    fn embedding(id: &str, note_id: &str, user_id: &str, text: &str) -> NoteEmbedding {
        NoteEmbedding {
            id: id.to_string(),
            note_id: note_id.to_string(),
            user_id: user_id.to_string(),
            chunk_index: 0,
            content: text.to_string(),
            vector: vec![1.0, 0.0],
            dimensions: 2,
            model: "test-model".to_string(),
            lexical_content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_lexical_index_ranked_search() {
        let index = MemoryLexicalIndex::new();
        index
            .index_chunk(&embedding("a", "n1", "u1", "rust borrow checker"))
            .await
            .unwrap();
        index
            .index_chunk(&embedding("b", "n2", "u1", "python garbage collection"))
            .await
            .unwrap();
        index
            .index_chunk(&embedding("c", "n3", "u2", "rust lifetimes"))
            .await
            .unwrap();

        let hits = index.search_ranked("u1", "rust", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].note_id, "n1");
        assert!(hits[0].score > 0.0);

        // Other user's corpus is invisible.
        let hits = index.search_ranked("u2", "rust", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
    }

    #[tokio::test]
    async fn test_memory_lexical_index_delete_by_note() {
        let index = MemoryLexicalIndex::new();
        index
            .index_chunk(&embedding("a", "n1", "u1", "alpha beta"))
            .await
            .unwrap();
        index
            .index_chunk(&embedding("b", "n1", "u1", "alpha gamma"))
            .await
            .unwrap();
        index
            .index_chunk(&embedding("c", "n2", "u1", "alpha delta"))
            .await
            .unwrap();

        index.delete_by_note_id("n1").await.unwrap();

        let hits = index.search_ranked("u1", "alpha", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, "n2");
    }

    #[tokio::test]
    async fn test_hybrid_search_empty_sanitized_query_is_vector_only() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let lexical_index = Arc::new(MemoryLexicalIndex::new());

        let mut e = embedding("a", "n1", "u1", "some text");
        e.vector = vec![1.0, 0.0];
        vector_index.upsert_batch(&[e.clone()]).await.unwrap();
        lexical_index.index_chunk(&e).await.unwrap();

        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            vector_index,
            lexical_index,
        );

        let results = searcher.search("u1", "?!,.", &[1.0, 0.0], 5).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].found_by_vector);
        assert!(!results[0].found_by_lexical);
    }

    #[tokio::test]
    async fn test_hybrid_search_end_to_end() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let lexical_index = Arc::new(MemoryLexicalIndex::new());

        let mut rust = embedding("a", "n1", "u1", "rust ownership and borrowing");
        rust.vector = vec![1.0, 0.0];
        let mut python = embedding("b", "n2", "u1", "python decorators");
        python.vector = vec![0.0, 1.0];

        for e in [&rust, &python] {
            vector_index.upsert_batch(std::slice::from_ref(e)).await.unwrap();
            lexical_index.index_chunk(e).await.unwrap();
        }

        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            vector_index,
            lexical_index,
        );

        let results = searcher
            .search("u1", "rust ownership", &[0.9, 0.1], 5)
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].found_by_vector);
        assert!(results[0].found_by_lexical);
    }

    struct BrokenVectorIndex;

    #[async_trait]
    impl VectorIndex for BrokenVectorIndex {
        async fn upsert_batch(&self, _embeddings: &[NoteEmbedding]) -> Result<(), RagError> {
            Err(RagError::Store("vector store down".to_string()))
        }

        async fn delete_by_note_id(&self, _note_id: &str) -> Result<(), RagError> {
            Err(RagError::Store("vector store down".to_string()))
        }

        async fn search_nearest(
            &self,
            _user_id: &str,
            _vector: &[f32],
            _dimensions: usize,
            _k: usize,
        ) -> Result<Vec<VectorHit>, RagError> {
            Err(RagError::Store("vector store down".to_string()))
        }

        async fn stats(&self, _user_id: &str) -> Result<crate::store::IndexStats, RagError> {
            Err(RagError::Store("vector store down".to_string()))
        }
    }

    struct BrokenLexicalIndex;

    #[async_trait]
    impl LexicalIndex for BrokenLexicalIndex {
        async fn index_chunk(&self, _embedding: &NoteEmbedding) -> Result<(), RagError> {
            Err(RagError::Store("lexical store down".to_string()))
        }

        async fn delete_by_note_id(&self, _note_id: &str) -> Result<(), RagError> {
            Err(RagError::Store("lexical store down".to_string()))
        }

        async fn search_ranked(
            &self,
            _user_id: &str,
            _sanitized_query: &str,
            _k: usize,
        ) -> Result<Vec<LexicalHit>, RagError> {
            Err(RagError::Store("lexical store down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_vector_branch_failure_degrades_to_lexical_only() {
        let lexical_index = Arc::new(MemoryLexicalIndex::new());
        lexical_index
            .index_chunk(&embedding("a", "n1", "u1", "rust borrow checker"))
            .await
            .unwrap();

        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            Arc::new(BrokenVectorIndex),
            lexical_index,
        );

        let results = searcher.search("u1", "rust", &[1.0, 0.0], 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert!(results[0].found_by_lexical);
        assert!(!results[0].found_by_vector);
        assert_eq!(results[0].vector_rank, RANK_SENTINEL);
    }

    #[tokio::test]
    async fn test_lexical_branch_failure_degrades_to_vector_only() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        vector_index
            .upsert_batch(&[embedding("a", "n1", "u1", "rust borrow checker")])
            .await
            .unwrap();

        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            vector_index,
            Arc::new(BrokenLexicalIndex),
        );

        let results = searcher.search("u1", "rust", &[1.0, 0.0], 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert!(results[0].found_by_vector);
        assert!(!results[0].found_by_lexical);
        assert_eq!(results[0].lexical_rank, RANK_SENTINEL);
    }

    #[tokio::test]
    async fn test_both_branches_failing_yields_empty_list() {
        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            Arc::new(BrokenVectorIndex),
            Arc::new(BrokenLexicalIndex),
        );

        let results = searcher.search("u1", "rust", &[1.0, 0.0], 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_search_truncates_to_top_k() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let lexical_index = Arc::new(MemoryLexicalIndex::new());

        let mut batch = Vec::new();
        for i in 0..10 {
            let mut e = embedding(&format!("c{}", i), &format!("n{}", i), "u1", "filler");
            e.vector = vec![1.0, i as f32 * 0.01];
            batch.push(e);
        }
        vector_index.upsert_batch(&batch).await.unwrap();

        let searcher = HybridSearcher::new(
            SearchConfig::default(),
            vector_index,
            lexical_index,
        );

        let results = searcher.search("u1", "anything", &[1.0, 0.0], 3).await;
        assert_eq!(results.len(), 3);
    }
}
