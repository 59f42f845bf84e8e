//! Brute-force in-memory vector store.
//!
//! Scans every record on query. Fine for tests and small ephemeral
//! collections; anything durable should use the SQLite backend.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;

use super::{ChunkRecord, CollectionStats, QueryFilter, QueryHit, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<ChunkRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add_batch(&self, records: Vec<ChunkRecord>) -> Result<()> {
        let mut guard = self.records.write().unwrap();
        for record in records {
            // Replace on id collision so re-adds stay idempotent.
            if let Some(existing) = guard.iter_mut().find(|r| r.id == record.id) {
                *existing = record;
            } else {
                guard.push(record);
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<QueryHit>> {
        let guard = self.records.read().unwrap();
        let mut hits: Vec<QueryHit> = guard
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| QueryHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: 1.0 - cosine_similarity(vector, &r.vector) as f64,
            })
            .collect();
        // Stable sort keeps insertion order on ties.
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64> {
        let mut guard = self.records.write().unwrap();
        let before = guard.len();
        guard.retain(|r| r.metadata.source_id != source_id);
        Ok((before - guard.len()) as u64)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let guard = self.records.read().unwrap();
        let mut stats = CollectionStats {
            total_chunks: guard.len() as u64,
            ..Default::default()
        };
        let mut sources = HashSet::new();
        for record in guard.iter() {
            sources.insert(record.metadata.source_id.as_str());
            *stats
                .content_types
                .entry(record.metadata.content_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.source_count = sources.len() as u64;
        Ok(stats)
    }

    async fn reset(&self) -> Result<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }
}
