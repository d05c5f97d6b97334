//! Qdrant-backed vector index.
//!
//! Stores one point per note chunk with the chunk text and ownership
//! metadata in the payload. Searches are always filtered by `user_id` and
//! by `dimensions`, so embeddings produced by different models never get
//! compared against each other.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use crate::error::RagError;
use crate::store::{IndexStats, VectorHit, VectorIndex};
use crate::types::NoteEmbedding;

type QdrantValue = qdrant_client::qdrant::Value;

/// Configuration for connecting to Qdrant.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL
    pub url: String,

    /// API key (optional)
    pub api_key: Option<String>,

    /// Collection name
    pub collection_name: String,

    /// Vector dimensions the collection is created with
    pub dimensions: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_name: crate::DEFAULT_COLLECTION.to_string(),
            dimensions: recall_providers::DEFAULT_DIMENSIONS,
        }
    }
}

pub struct QdrantVectorIndex {
    client: Qdrant,
    collection_name: String,
    dimensions: usize,
}

impl QdrantVectorIndex {
    /// Connect to Qdrant and ensure the collection exists.
    pub async fn connect(config: &QdrantConfig) -> Result<Self, RagError> {
        info!("Connecting to Qdrant at {}", config.url);

        let mut builder = Qdrant::from_url(&config.url).skip_compatibility_check();
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Store(format!("failed to connect to Qdrant: {}", e)))?;

        let index = Self {
            client,
            collection_name: config.collection_name.clone(),
            dimensions: config.dimensions,
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<(), RagError> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(store_err)?;
        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection_name);

        if !exists {
            info!(
                "Creating collection {} with {} dimensions",
                self.collection_name, self.dimensions
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                        VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(store_err)?;
        } else {
            debug!("Collection {} already exists", self.collection_name);
        }

        Ok(())
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert_batch(&self, embeddings: &[NoteEmbedding]) -> Result<(), RagError> {
        if embeddings.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} points", embeddings.len());
        let indexed_at = Utc::now();

        let points: Vec<PointStruct> = embeddings
            .iter()
            .map(|e| {
                PointStruct::new(
                    e.id.clone(),
                    e.vector.clone(),
                    embedding_payload(e, indexed_at),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_by_note_id(&self, note_id: &str) -> Result<(), RagError> {
        debug!("Deleting points for note {}", note_id);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(Filter::must([Condition::matches(
                        "note_id",
                        note_id.to_string(),
                    )])),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn search_nearest(
        &self,
        user_id: &str,
        vector: &[f32],
        dimensions: usize,
        k: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let filter = Filter::must([
            Condition::matches("user_id", user_id.to_string()),
            Condition::matches("dimensions", dimensions as i64),
        ]);

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector.to_vec(), k as u64)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(store_err)?;

        let hits: Vec<VectorHit> = results
            .result
            .into_iter()
            .map(|p| {
                let id = p
                    .id
                    .and_then(|id| match id.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => Some(u),
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => {
                            Some(n.to_string())
                        }
                        None => None,
                    })
                    .unwrap_or_default();

                VectorHit {
                    id,
                    note_id: extract_string(p.payload.get("note_id")),
                    content: extract_string(p.payload.get("content")),
                    score: p.score,
                }
            })
            .collect();

        debug!("Found {} vector hits", hits.len());
        Ok(hits)
    }

    async fn stats(&self, user_id: &str) -> Result<IndexStats, RagError> {
        let filter = Filter::must([Condition::matches("user_id", user_id.to_string())]);

        let count = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection_name)
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(store_err)?
            .result
            .map(|r| r.count as usize)
            .unwrap_or(0);

        // One scroll pass over payloads to derive note counts and recency.
        let mut unique_notes: HashSet<String> = HashSet::new();
        let mut last_indexed_at: Option<DateTime<Utc>> = None;
        let mut provider: Option<String> = None;
        let mut offset = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection_name)
                .filter(filter.clone())
                .with_payload(true)
                .limit(256);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let page = self.client.scroll(builder).await.map_err(store_err)?;
            for point in &page.result {
                unique_notes.insert(extract_string(point.payload.get("note_id")));
                if provider.is_none() {
                    let model = extract_string(point.payload.get("model"));
                    if !model.is_empty() {
                        provider = Some(model);
                    }
                }
                if let Ok(ts) = extract_string(point.payload.get("indexed_at"))
                    .parse::<DateTime<Utc>>()
                {
                    last_indexed_at = Some(last_indexed_at.map_or(ts, |prev| prev.max(ts)));
                }
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        unique_notes.remove("");

        Ok(IndexStats {
            total_embeddings: count,
            unique_notes: unique_notes.len(),
            last_indexed_at,
            provider,
        })
    }
}

fn store_err(e: qdrant_client::QdrantError) -> RagError {
    RagError::Store(e.to_string())
}

fn embedding_payload(e: &NoteEmbedding, indexed_at: DateTime<Utc>) -> HashMap<String, QdrantValue> {
    let mut map = HashMap::new();
    map.insert("note_id".to_string(), QdrantValue::from(e.note_id.clone()));
    map.insert("user_id".to_string(), QdrantValue::from(e.user_id.clone()));
    map.insert(
        "chunk_index".to_string(),
        QdrantValue::from(e.chunk_index as i64),
    );
    map.insert("content".to_string(), QdrantValue::from(e.content.clone()));
    map.insert(
        "dimensions".to_string(),
        QdrantValue::from(e.dimensions as i64),
    );
    map.insert("model".to_string(), QdrantValue::from(e.model.clone()));
    map.insert(
        "indexed_at".to_string(),
        QdrantValue::from(indexed_at.to_rfc3339()),
    );
    map
}

fn extract_string(value: Option<&QdrantValue>) -> String {
    value
        .and_then(|v| {
            if let Some(qdrant_client::qdrant::value::Kind::StringValue(s)) = &v.kind {
                Some(s.clone())
            } else {
                None
            }
        })
        .unwrap_or_default()
}
