//! Storage collaborator traits.
//!
//! The pipeline never talks to a concrete store directly: vector search,
//! lexical search and job persistence sit behind these narrow seams. How a
//! backing engine implements similarity search or term ranking is its own
//! business; the pipeline only needs the primitives below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::jobs::IndexingJob;
use crate::types::NoteEmbedding;

/// A vector-branch candidate.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub note_id: String,
    pub content: String,
    /// Similarity score, higher is better.
    pub score: f32,
}

/// A lexical-branch candidate.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub id: String,
    pub note_id: String,
    pub content: String,
    /// Term-ranking score, higher is better.
    pub score: f32,
}

/// Aggregate statistics for a user's slice of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_embeddings: usize,
    pub unique_notes: usize,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub provider: Option<String>,
}

/// Similarity-searchable store of chunk vectors.
///
/// Implementations must honor the dimension partition: `search_nearest`
/// only considers embeddings whose `dimensions` match the query's, and
/// `delete_by_note_id` is scoped strictly to the given note.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert_batch(&self, embeddings: &[NoteEmbedding]) -> Result<(), RagError>;

    async fn delete_by_note_id(&self, note_id: &str) -> Result<(), RagError>;

    async fn search_nearest(
        &self,
        user_id: &str,
        vector: &[f32],
        dimensions: usize,
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError>;

    async fn stats(&self, user_id: &str) -> Result<IndexStats, RagError>;
}

/// Term-ranking full-text store.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Index one chunk's lexical content.
    async fn index_chunk(&self, embedding: &NoteEmbedding) -> Result<(), RagError>;

    async fn delete_by_note_id(&self, note_id: &str) -> Result<(), RagError>;

    /// Ranked retrieval for an already-sanitized query.
    async fn search_ranked(
        &self,
        user_id: &str,
        sanitized_query: &str,
        k: usize,
    ) -> Result<Vec<LexicalHit>, RagError>;
}

/// Plain CRUD persistence for indexing jobs. No business logic: the state
/// machine lives in the tracker, the store only records it.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &IndexingJob) -> Result<(), RagError>;

    async fn get(&self, job_id: &str) -> Result<Option<IndexingJob>, RagError>;

    async fn update(&self, job: &IndexingJob) -> Result<(), RagError>;

    /// The user's current Pending or Running job, if any.
    async fn find_active_for_user(&self, user_id: &str) -> Result<Option<IndexingJob>, RagError>;
}
