//! In-memory store implementations.
//!
//! Brute-force cosine similarity is perfectly adequate for corpora up to a
//! few tens of thousands of chunks and keeps the full pipeline runnable
//! without external services; it also backs the test suite. Production
//! deployments use [`crate::qdrant::QdrantVectorIndex`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::RagError;
use crate::jobs::IndexingJob;
use crate::store::{IndexStats, JobStore, VectorHit, VectorIndex};
use crate::types::NoteEmbedding;

/// Cosine similarity of two equal-length vectors. Zero-magnitude vectors
/// score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[derive(Default)]
struct VectorState {
    embeddings: HashMap<String, NoteEmbedding>,
    last_indexed_at: HashMap<String, DateTime<Utc>>,
}

/// Brute-force in-memory vector index.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<VectorState>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert_batch(&self, embeddings: &[NoteEmbedding]) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for embedding in embeddings {
            state.last_indexed_at.insert(embedding.user_id.clone(), now);
            state
                .embeddings
                .insert(embedding.id.clone(), embedding.clone());
        }
        Ok(())
    }

    async fn delete_by_note_id(&self, note_id: &str) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        state.embeddings.retain(|_, e| e.note_id != note_id);
        Ok(())
    }

    async fn search_nearest(
        &self,
        user_id: &str,
        vector: &[f32],
        dimensions: usize,
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let state = self.state.read().await;

        // Dimension partition: never compare mismatched vectors.
        let mut hits: Vec<VectorHit> = state
            .embeddings
            .values()
            .filter(|e| e.user_id == user_id && e.dimensions == dimensions)
            .map(|e| VectorHit {
                id: e.id.clone(),
                note_id: e.note_id.clone(),
                content: e.content.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn stats(&self, user_id: &str) -> Result<IndexStats, RagError> {
        let state = self.state.read().await;
        let user_embeddings: Vec<&NoteEmbedding> = state
            .embeddings
            .values()
            .filter(|e| e.user_id == user_id)
            .collect();

        let unique_notes = user_embeddings
            .iter()
            .map(|e| e.note_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        Ok(IndexStats {
            total_embeddings: user_embeddings.len(),
            unique_notes,
            last_indexed_at: state.last_indexed_at.get(user_id).copied(),
            provider: user_embeddings.first().map(|e| e.model.clone()),
        })
    }
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, IndexingJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &IndexingJob) -> Result<(), RagError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RagError::Store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<IndexingJob>, RagError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job: &IndexingJob) -> Result<(), RagError> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(RagError::Store(format!("job {} does not exist", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_active_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<IndexingJob>, RagError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|j| j.user_id == user_id && j.status.is_active())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;

    fn embedding(id: &str, note_id: &str, user_id: &str, vector: Vec<f32>) -> NoteEmbedding {
        let dimensions = vector.len();
        NoteEmbedding {
            id: id.to_string(),
            note_id: note_id.to_string(),
            user_id: user_id.to_string(),
            chunk_index: 0,
            content: format!("content of {}", id),
            vector,
            dimensions,
            model: "test-model".to_string(),
            lexical_content: String::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(&[
                embedding("a", "n1", "u1", vec![1.0, 0.0]),
                embedding("b", "n2", "u1", vec![0.7, 0.7]),
                embedding("c", "n3", "u1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.search_nearest("u1", &[1.0, 0.0], 2, 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[2].id, "c");
    }

    #[tokio::test]
    async fn test_search_respects_user_scope() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(&[
                embedding("a", "n1", "u1", vec![1.0, 0.0]),
                embedding("b", "n2", "u2", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search_nearest("u1", &[1.0, 0.0], 2, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_dimension_partition_isolation() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(&[
                embedding("small", "n1", "u1", vec![1.0, 0.0]),
                embedding("large", "n2", "u1", vec![1.0, 0.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        // A 2-d query only ever sees 2-d embeddings.
        let hits = index.search_nearest("u1", &[1.0, 0.0], 2, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "small");
    }

    #[tokio::test]
    async fn test_delete_scoped_to_note() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(&[
                embedding("a", "n1", "u1", vec![1.0, 0.0]),
                embedding("b", "n1", "u1", vec![0.9, 0.1]),
                embedding("c", "n2", "u1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        index.delete_by_note_id("n1").await.unwrap();

        let stats = index.stats("u1").await.unwrap();
        assert_eq!(stats.total_embeddings, 1);
        assert_eq!(stats.unique_notes, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let index = InMemoryVectorIndex::new();
        let stats = index.stats("u1").await.unwrap();
        assert_eq!(stats.total_embeddings, 0);
        assert!(stats.last_indexed_at.is_none());

        index
            .upsert_batch(&[
                embedding("a", "n1", "u1", vec![1.0]),
                embedding("b", "n1", "u1", vec![0.5]),
                embedding("c", "n2", "u1", vec![0.1]),
            ])
            .await
            .unwrap();

        let stats = index.stats("u1").await.unwrap();
        assert_eq!(stats.total_embeddings, 3);
        assert_eq!(stats.unique_notes, 2);
        assert!(stats.last_indexed_at.is_some());
        assert_eq!(stats.provider.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_stats_are_user_scoped() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_batch(&[embedding("a", "n1", "u1", vec![1.0])])
            .await
            .unwrap();

        // Another user's slice is untouched by u1's writes.
        let stats = index.stats("u2").await.unwrap();
        assert_eq!(stats.total_embeddings, 0);
        assert!(stats.last_indexed_at.is_none());
        assert!(stats.provider.is_none());

        let stats = index.stats("u1").await.unwrap();
        assert!(stats.last_indexed_at.is_some());
        assert_eq!(stats.provider.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_job_store_crud() {
        let store = MemoryJobStore::new();
        let mut job = IndexingJob::new("u1", "openai", 5);

        store.create(&job).await.unwrap();
        assert!(store.create(&job).await.is_err());

        let fetched = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);

        job.status = JobStatus::Running;
        store.update(&job).await.unwrap();
        let fetched = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Running);

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_active_for_user() {
        let store = MemoryJobStore::new();
        let mut done = IndexingJob::new("u1", "openai", 1);
        done.status = JobStatus::Completed;
        store.create(&done).await.unwrap();

        assert!(store.find_active_for_user("u1").await.unwrap().is_none());

        let pending = IndexingJob::new("u1", "openai", 1);
        store.create(&pending).await.unwrap();

        let active = store.find_active_for_user("u1").await.unwrap().unwrap();
        assert_eq!(active.id, pending.id);
        assert!(store.find_active_for_user("u2").await.unwrap().is_none());
    }
}
