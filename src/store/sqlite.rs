//! SQLite-backed vector store.
//!
//! Chunks live in a single `chunks` table with embeddings stored as
//! little-endian f32 BLOBs. Similarity is computed in Rust over the
//! filtered candidate rows; at the collection sizes this engine targets
//! (tens of thousands of chunks) a full scan is cheaper than maintaining
//! an ANN index.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

use super::{ChunkRecord, CollectionStats, QueryFilter, QueryHit, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_content_type ON chunks(content_type)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_batch(&self, records: Vec<ChunkRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (id, source_id, chunk_index, content_type, text, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.metadata.source_id)
            .bind(record.metadata.chunk_index)
            .bind(record.metadata.content_type.as_str())
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<QueryHit>> {
        let mut sql = String::from("SELECT id, text, metadata_json, embedding FROM chunks");
        let mut clauses = Vec::new();
        if filter.content_type.is_some() {
            clauses.push("content_type = ?");
        }
        if filter.source_id.is_some() {
            clauses.push("source_id = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // rowid order makes tie-breaking follow insertion order.
        sql.push_str(" ORDER BY rowid");

        let mut query = sqlx::query(&sql);
        if let Some(ct) = filter.content_type {
            query = query.bind(ct.as_str());
        }
        if let Some(source_id) = &filter.source_id {
            query = query.bind(source_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            hits.push(QueryHit {
                id: row.get("id"),
                text: row.get("text"),
                metadata: serde_json::from_str(&metadata_json)?,
                distance: 1.0 - cosine_similarity(vector, &stored) as f64,
            });
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_id) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        let mut stats = CollectionStats {
            total_chunks: total as u64,
            source_count: sources as u64,
            ..Default::default()
        };
        let rows =
            sqlx::query("SELECT content_type, COUNT(*) AS n FROM chunks GROUP BY content_type")
                .fetch_all(&self.pool)
                .await?;
        for row in rows {
            let content_type: String = row.get("content_type");
            let n: i64 = row.get("n");
            stats.content_types.insert(content_type, n as u64);
        }
        Ok(stats)
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS chunks")
            .execute(&self.pool)
            .await?;
        self.migrate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ContentType};

    fn record(id: &str, source: &str, ct: ContentType, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            text: format!("text for {id}"),
            metadata: ChunkMetadata {
                source_id: source.to_string(),
                chunk_index: 0,
                content_type: ct,
                filename: "f.txt".to_string(),
                file_type: ".txt".to_string(),
                title: None,
            },
            vector,
        }
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::connect(&dir.path().join("index.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_roundtrip_query() {
        let (_dir, store) = temp_store().await;
        store
            .add_batch(vec![
                record("a", "s1", ContentType::Text, vec![1.0, 0.0]),
                record("b", "s1", ContentType::Text, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .query(&[1.0, 0.0], 5, &QueryFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].metadata.source_id, "s1");
        assert!(hits[0].distance < 1e-6);
    }

    #[tokio::test]
    async fn test_content_type_filter() {
        let (_dir, store) = temp_store().await;
        store
            .add_batch(vec![
                record("a", "s1", ContentType::Code, vec![1.0]),
                record("b", "s1", ContentType::Documentation, vec![1.0]),
            ])
            .await
            .unwrap();

        let filter = QueryFilter {
            content_type: Some(ContentType::Documentation),
            ..Default::default()
        };
        let hits = store.query(&[1.0], 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_delete_stats_reset() {
        let (_dir, store) = temp_store().await;
        store
            .add_batch(vec![
                record("a", "s1", ContentType::Code, vec![1.0]),
                record("b", "s2", ContentType::Text, vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("s1").await.unwrap(), 1);
        assert_eq!(store.delete_by_source("missing").await.unwrap(), 0);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.source_count, 1);
        assert_eq!(stats.content_types.get("text"), Some(&1));

        store.reset().await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_chunks, 0);
    }
}
