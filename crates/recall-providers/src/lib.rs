//! Provider abstractions for the Recall RAG pipeline.
//!
//! This crate defines the pluggable backends the pipeline depends on:
//! - Embedding generation (text -> vector)
//! - Chat completion (used for HyDE drafts and query paraphrasing)
//! - Relevance scoring (query/document grading for the reranker)
//!
//! Concrete implementations target OpenAI-compatible HTTP APIs. Providers
//! are selected by name through [`ProviderRegistry`]; a disabled or missing
//! provider is a typed error, never a panic.

pub mod completion;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod registry;
pub mod relevance;

pub use completion::{Completion, CompletionProvider};
pub use embedding::EmbeddingProvider;
pub use error::ProviderError;
pub use openai::{OpenAiCompletions, OpenAiEmbeddings};
pub use registry::ProviderRegistry;
pub use relevance::{ChatRelevanceScorer, RelevanceScorer};

/// Default embedding dimensions (text-embedding-3-small).
pub const DEFAULT_DIMENSIONS: usize = 1536;
