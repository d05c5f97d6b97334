//! Core data model shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's note, the unit of indexing. Owned by the calling application;
/// the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored chunk embedding, one per chunk.
///
/// `dimensions` always equals the producing provider's declared
/// dimensionality and acts as a partition key: a query vector is only
/// compared against embeddings with matching dimensions, so a provider
/// change never silently mixes incompatible vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEmbedding {
    pub id: String,
    pub note_id: String,
    pub user_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub model: String,
    /// Text indexed for lexical search; usually the chunk content, but may
    /// carry extra searchable metadata (title, tags).
    pub lexical_content: String,
}
