//! Gateway pairing the embedding provider with the vector store.
//!
//! All index mutations flow through here so batching, id assignment, and
//! availability checks live in one place. Chunk ids are deterministic:
//! `"{source_id}_{position}"` where position counts chunks across the whole
//! run for that source. Re-indexing a source therefore overwrites rather
//! than duplicates, as long as the caller clears the source first (which
//! the service layer does on update).

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::EngineError;
use crate::models::ChunkMetadata;
use crate::store::{ChunkRecord, CollectionStats, QueryFilter, QueryHit, VectorStore};

/// A chunk with metadata attached, awaiting embedding.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub struct VectorGateway {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl VectorGateway {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Embed and persist `chunks` in batches. Each batch is committed
    /// independently; a failure part-way through leaves earlier batches
    /// stored and is reported to the caller.
    pub async fn store_chunks(
        &self,
        source_id: &str,
        chunks: &[PreparedChunk],
    ) -> Result<usize, EngineError> {
        if !self.is_available() {
            return Err(EngineError::Unavailable("embedding backend"));
        }

        let mut stored = 0usize;
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.provider.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EngineError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            let base = batch_no * self.batch_size;
            let records: Vec<ChunkRecord> = batch
                .iter()
                .zip(vectors)
                .enumerate()
                .map(|(offset, (chunk, vector))| ChunkRecord {
                    id: format!("{}_{}", source_id, base + offset),
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    vector,
                })
                .collect();

            self.store
                .add_batch(records)
                .await
                .map_err(|e| EngineError::Store(e.to_string()))?;
            stored += batch.len();
            debug!(source_id, batch = batch_no, stored, "stored embedding batch");
        }
        Ok(stored)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if !self.is_available() {
            return Err(EngineError::Unavailable("embedding backend"));
        }
        let mut vectors = self.provider.embed(&[text.to_string()]).await?;
        if vectors.is_empty() {
            return Err(EngineError::Embedding("empty embedding response".into()));
        }
        Ok(vectors.remove(0))
    }

    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<QueryHit>, EngineError> {
        self.store
            .query(vector, k, filter)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError> {
        self.store
            .delete_by_source(source_id)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub async fn stats(&self) -> Result<CollectionStats, EngineError> {
        self.store
            .stats()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.store
            .reset()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }
}
