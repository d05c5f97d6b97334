//! Pipeline configuration.
//!
//! All tunables live here with serde defaults, so a config file or
//! environment only needs to name what it changes. `RagConfig::load` layers
//! an optional TOML file under `RECALL_`-prefixed environment overrides
//! (e.g. `RECALL_SEARCH__VECTOR_WEIGHT=0.8`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chunking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Token budget per chunk.
    pub max_tokens: usize,
    /// Tokens of trailing context carried into the next chunk.
    pub overlap_tokens: usize,
    /// When false, every note becomes a single chunk regardless of length.
    pub enabled: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
            enabled: true,
        }
    }
}

/// Hybrid search knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates fetched per branch before fusion.
    pub initial_k: usize,
    /// Weight of the vector branch in RRF.
    pub vector_weight: f32,
    /// Weight of the lexical branch in RRF.
    pub lexical_weight: f32,
    /// RRF k constant.
    pub rrf_k: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_k: 20,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            rrf_k: 60.0,
        }
    }
}

/// Query expansion knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Embed a hypothetical answer draft instead of only the raw query.
    pub enable_hyde: bool,
    /// Generate and embed paraphrased query variants.
    pub enable_multi_query: bool,
    /// Number of paraphrase variants when multi-query is enabled.
    pub num_variants: usize,
    /// Token cap for each generated variant.
    pub max_variant_tokens: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enable_hyde: false,
            enable_multi_query: false,
            num_variants: 2,
            max_variant_tokens: 200,
        }
    }
}

/// Reranking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Weight of the relevance score in the final blend.
    pub relevance_weight: f32,
    /// Weight of the RRF score in the final blend.
    pub rrf_weight: f32,
    /// Candidates below this final score are dropped. `None` keeps all.
    pub min_score: Option<f32>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.7,
            rrf_weight: 0.3,
            min_score: None,
        }
    }
}

/// Top-level retrieval knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned in the final context.
    pub top_k: usize,
    /// Final-score floor applied after reranking.
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.0,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub expansion: ExpansionConfig,
    pub rerank: RerankConfig,
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    /// Load configuration from an optional file plus `RECALL_` environment
    /// overrides. Missing file entries and variables fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RECALL").separator("__"),
        );

        let settings = builder.build().context("Failed to build configuration")?;
        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
