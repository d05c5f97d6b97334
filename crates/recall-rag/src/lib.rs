//! Retrieval-augmented generation pipeline for a personal note base.
//!
//! This crate provides:
//! - Token-budgeted, overlap-aware note chunking
//! - Embedding storage behind narrow vector/lexical index traits
//! - Hybrid search (vector + BM25) fused with Reciprocal Rank Fusion
//! - Query expansion (HyDE drafts and paraphrase variants)
//! - Relevance reranking with fusion-only fallback
//! - Context assembly for LLM prompts with citation discipline
//! - Background bulk-indexing jobs with partial-failure semantics
//!
//! A retrieval failure never blocks the chat flow it augments: every stage
//! degrades to a well-typed weaker result (vector-only ranking, fusion-only
//! scores, empty context) instead of surfacing an error.

pub mod chunker;
pub mod config;
pub mod error;
pub mod expander;
pub mod indexer;
pub mod jobs;
pub mod memory;
pub mod orchestrator;
pub mod qdrant;
pub mod reranker;
pub mod search;
pub mod store;
pub mod types;

// Re-exports
pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use config::{
    ChunkingConfig, ExpansionConfig, RagConfig, RerankConfig, RetrievalConfig, SearchConfig,
};
pub use error::RagError;
pub use expander::{ExpandedQuery, QueryExpander, QueryVariant, VariantKind};
pub use indexer::NoteIndexer;
pub use jobs::{IndexingJob, IndexingJobTracker, JobStatus};
pub use memory::{InMemoryVectorIndex, MemoryJobStore};
pub use orchestrator::{RagContext, RagOrchestrator};
pub use qdrant::{QdrantConfig, QdrantVectorIndex};
pub use reranker::{Reranker, RerankedResult};
pub use search::{sanitize_query, FusedResult, HybridSearcher, MemoryLexicalIndex, RANK_SENTINEL};
pub use store::{IndexStats, JobStore, LexicalHit, LexicalIndex, VectorHit, VectorIndex};
pub use types::{Note, NoteEmbedding};

/// Default Qdrant collection name.
pub const DEFAULT_COLLECTION: &str = "recall-notes";
