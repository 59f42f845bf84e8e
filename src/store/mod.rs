//! Vector store abstraction.
//!
//! [`VectorStore`] is the persistence seam: the gateway talks to it in terms
//! of [`ChunkRecord`]s going in and [`QueryHit`]s coming out, and never sees
//! backend details. Two backends ship: [`memory::InMemoryStore`] for tests
//! and ephemeral sessions, and [`sqlite::SqliteVectorStore`] for durable
//! local indexes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::models::{ChunkMetadata, ContentType};

/// Open the store selected by configuration: SQLite when a database path
/// is set, in-memory otherwise.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match &config.db_path {
        Some(path) => Ok(Arc::new(sqlite::SqliteVectorStore::connect(path).await?)),
        None => Ok(Arc::new(memory::InMemoryStore::new())),
    }
}

/// A chunk ready for storage: text, metadata, and its embedding vector.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

/// One nearest-neighbor match. `distance` is cosine distance; callers
/// convert to similarity as `1.0 - distance`.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f64,
}

/// Metadata restrictions applied before ranking.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub content_type: Option<ContentType>,
    pub source_id: Option<String>,
}

impl QueryFilter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(ct) = self.content_type {
            if metadata.content_type != ct {
                return false;
            }
        }
        if let Some(source_id) = &self.source_id {
            if &metadata.source_id != source_id {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over the whole collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionStats {
    pub total_chunks: u64,
    pub source_count: u64,
    /// Chunk count per content type label.
    pub content_types: HashMap<String, u64>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a batch of records. Each call is an independent
    /// commit; a later failure never rolls back earlier batches.
    async fn add_batch(&self, records: Vec<ChunkRecord>) -> Result<()>;

    /// Return the `k` nearest records passing `filter`, closest first.
    /// Ties preserve insertion order.
    async fn query(&self, vector: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<QueryHit>>;

    /// Remove every chunk belonging to `source_id`, returning how many were
    /// deleted. Unknown ids delete nothing and succeed.
    async fn delete_by_source(&self, source_id: &str) -> Result<u64>;

    async fn stats(&self) -> Result<CollectionStats>;

    /// Drop the entire collection.
    async fn reset(&self) -> Result<()>;
}
