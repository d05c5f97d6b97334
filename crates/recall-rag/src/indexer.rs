//! Note indexing: chunk, embed, store.

use std::sync::Arc;

use recall_providers::EmbeddingProvider;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::error::RagError;
use crate::store::{LexicalIndex, VectorIndex};
use crate::types::{Note, NoteEmbedding};

/// Indexes notes into the vector and lexical stores.
///
/// Reindexing always deletes a note's existing embeddings before inserting
/// fresh ones. The ordering is mandatory: if the embedding step fails
/// mid-way, the note is left with zero stale embeddings rather than
/// duplicates.
pub struct NoteIndexer {
    chunker: Chunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    lexical_index: Arc<dyn LexicalIndex>,
}

impl NoteIndexer {
    pub fn new(
        chunker: Chunker,
        embeddings: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            vector_index,
            lexical_index,
        }
    }

    /// The embedding provider backing this indexer.
    pub fn embeddings(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embeddings
    }

    /// Delete a note's embeddings from both indexes, then chunk, embed and
    /// store it fresh. Returns the number of chunks written.
    ///
    /// The cancellation token is honored at every suspension point; a
    /// cancelled reindex leaves already-written chunks in place.
    pub async fn reindex_note(
        &self,
        note: &Note,
        cancel: &CancellationToken,
    ) -> Result<usize, RagError> {
        if cancel.is_cancelled() {
            return Err(RagError::Job("cancelled".to_string()));
        }

        debug!(note_id = %note.id, "Reindexing note");

        // Delete before insert, always.
        self.vector_index.delete_by_note_id(&note.id).await?;
        self.lexical_index.delete_by_note_id(&note.id).await?;

        let chunks = self.chunker.chunk_note(note);
        let total = chunks.len();
        let dimensions = self.embeddings.dimensions();
        let model = self.embeddings.model_name().to_string();
        let batch_size = self.embeddings.max_batch_size().max(1);

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            let vectors = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RagError::Job("cancelled".to_string()));
                }
                res = self.embeddings.generate_embeddings(&texts) => res?,
            };

            let mut embeddings = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(vectors.into_iter()) {
                if vector.len() != dimensions {
                    return Err(RagError::Validation(format!(
                        "embedding dimensions mismatch: provider declares {}, got {}",
                        dimensions,
                        vector.len()
                    )));
                }

                embeddings.push(NoteEmbedding {
                    id: Uuid::new_v4().to_string(),
                    note_id: note.id.clone(),
                    user_id: note.user_id.clone(),
                    chunk_index: chunk.index,
                    content: chunk.content.clone(),
                    vector,
                    dimensions,
                    model: model.clone(),
                    lexical_content: format!("{}\n{}", note.title, chunk.content),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RagError::Job("cancelled".to_string()));
                }
                res = self.vector_index.upsert_batch(&embeddings) => res?,
            }

            for embedding in &embeddings {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RagError::Job("cancelled".to_string()));
                    }
                    res = self.lexical_index.index_chunk(embedding) => res?,
                }
            }
        }

        debug!(note_id = %note.id, chunks = total, "Note indexed");
        Ok(total)
    }
}
