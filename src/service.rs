//! Source lifecycle orchestration: load, chunk, embed, store.
//!
//! [`RagService`] owns the pipeline and drives each source through
//! `pending → processing → indexed | error`. Every mutation of a source's
//! index (process, update, remove) is serialized per source id with a keyed
//! async mutex, so concurrent workers and watcher-triggered updates cannot
//! interleave deletes and writes for the same source. Different sources
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::chunker;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::{PreparedChunk, VectorGateway};
use crate::loader::{DriveProvider, SourceLoader};
use crate::models::{
    ChunkMetadata, ContentType, KnowledgeSource, SearchResult, SourceStatus,
};
use crate::search;
use crate::store::CollectionStats;
use crate::watcher::{ChangeEvent, ChangeKind};

pub struct RagService {
    config: EngineConfig,
    gateway: VectorGateway,
    loader: SourceLoader,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RagService {
    pub fn new(
        config: EngineConfig,
        gateway: VectorGateway,
        drive: Option<Arc<dyn DriveProvider>>,
    ) -> anyhow::Result<Self> {
        let loader = SourceLoader::new(&config, drive)?;
        Ok(Self {
            config,
            gateway,
            loader,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    /// Build the provider, store, and gateway from configuration alone.
    pub async fn from_config(
        config: EngineConfig,
        drive: Option<Arc<dyn DriveProvider>>,
    ) -> anyhow::Result<Self> {
        let provider: Arc<dyn crate::embedding::EmbeddingProvider> =
            Arc::from(crate::embedding::create_provider(&config.embedding)?);
        let store = crate::store::open_store(&config.store).await?;
        let gateway = VectorGateway::new(provider, store, config.embedding.batch_size);
        Self::new(config, gateway, drive)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn source_lock(&self, source_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn lock_entry_count(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    /// Index a source end to end. Returns whether it reached `Indexed`;
    /// all failure detail lands on the source itself.
    pub async fn process(&self, source: &mut KnowledgeSource) -> bool {
        let lock = self.source_lock(&source.id);
        let _guard = lock.lock().await;
        self.process_locked(source).await
    }

    async fn process_locked(&self, source: &mut KnowledgeSource) -> bool {
        match self.run_pipeline(source).await {
            Ok((files, chunks)) => {
                source.file_count = files;
                source.chunk_count = chunks;
                source.update_status(SourceStatus::Indexed, None);
                info!(
                    source_id = %source.id,
                    files,
                    chunks,
                    "source indexed"
                );
                true
            }
            Err(e) => {
                warn!(source_id = %source.id, error = %e, "source processing failed");
                source.update_status(SourceStatus::Error, Some(e.to_string()));
                false
            }
        }
    }

    async fn run_pipeline(
        &self,
        source: &mut KnowledgeSource,
    ) -> Result<(usize, usize), EngineError> {
        if !self.gateway.is_available() {
            return Err(EngineError::Unavailable("embedding backend"));
        }

        source.update_status(SourceStatus::Processing, None);

        let documents = self.loader.load(source).await;
        if documents.is_empty() {
            return Err(EngineError::NoDocuments);
        }

        let mut prepared = Vec::new();
        for doc in &documents {
            let content_type = ContentType::from_extension(&doc.file_type);
            for text in chunker::chunk_document(&doc.text, &doc.file_type, &self.config.chunking) {
                prepared.push(PreparedChunk {
                    text,
                    metadata: ChunkMetadata {
                        source_id: source.id.clone(),
                        chunk_index: prepared.len() as i64,
                        content_type,
                        filename: doc.filename.clone(),
                        file_type: doc.file_type.clone(),
                        title: doc.title.clone(),
                    },
                });
            }
        }
        if prepared.is_empty() {
            return Err(EngineError::NoChunks);
        }

        let stored = self.gateway.store_chunks(&source.id, &prepared).await?;
        Ok((documents.len(), stored))
    }

    /// Re-index a changed source: best-effort delete of its existing
    /// chunks, then a full process. A failed delete is logged and the
    /// re-process proceeds; deterministic chunk ids make most stale rows
    /// overwrite anyway.
    pub async fn update(&self, source: &mut KnowledgeSource) -> bool {
        let lock = self.source_lock(&source.id);
        let _guard = lock.lock().await;

        if let Err(e) = self.gateway.delete_by_source(&source.id).await {
            warn!(source_id = %source.id, error = %e, "pre-update delete failed, re-indexing anyway");
        }
        self.process_locked(source).await
    }

    /// Remove a source's chunks. Idempotent: removing an unknown source
    /// succeeds. Returns false only when the store itself fails.
    pub async fn remove(&self, source_id: &str) -> bool {
        let lock = self.source_lock(source_id);
        let guard = lock.lock().await;

        let ok = match self.gateway.delete_by_source(source_id).await {
            Ok(deleted) => {
                info!(source_id, deleted, "source removed from index");
                true
            }
            Err(e) => {
                warn!(source_id, error = %e, "failed to remove source");
                false
            }
        };
        drop(guard);

        // Evict the keyed lock so the map does not grow with every source
        // ever removed. While the map mutex is held no new clone can be
        // handed out, so a strong count of two (the map's and ours) proves
        // no other task holds or awaits this lock.
        let mut locks = self.locks.lock().unwrap();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(source_id);
        }
        ok
    }

    /// Clear the whole collection and re-process every source in order.
    /// Per-source failures are recorded in the result map and do not stop
    /// the run.
    pub async fn reindex_all(
        &self,
        sources: &mut [KnowledgeSource],
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();

        if let Err(e) = self.gateway.reset().await {
            warn!(error = %e, "failed to reset collection, aborting reindex");
            for source in sources.iter() {
                results.insert(source.id.clone(), false);
            }
            return results;
        }

        info!(count = sources.len(), "reindexing all sources");
        for source in sources.iter_mut() {
            let ok = self.process(source).await;
            results.insert(source.id.clone(), ok);
        }
        results
    }

    /// [`Self::search_similar`] with the configured default result count
    /// and no filters.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.search_similar(query, self.config.retrieval.default_k, None, None)
            .await
    }

    /// Ranked similarity search. Failures (including an unavailable
    /// backend) are logged and produce an empty result rather than an
    /// error, so callers can always render "no results".
    pub async fn search_similar(
        &self,
        query: &str,
        k: usize,
        content_type: Option<ContentType>,
        source_id: Option<&str>,
    ) -> Vec<SearchResult> {
        match search::search_similar(
            &self.gateway,
            &self.config.retrieval,
            query,
            k,
            content_type,
            source_id,
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(query, error = %e, "search failed");
                Vec::new()
            }
        }
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats, EngineError> {
        self.gateway.stats().await
    }

    /// Probe that a URL-backed source is reachable before registering it.
    pub async fn validate_url(&self, url: &str) -> bool {
        self.loader.validate_url(url).await
    }

    /// React to a filesystem change on a watched source. Creations and
    /// modifications trigger a full update; deletions are logged only, the
    /// stale chunks remain until the source is updated or removed.
    pub async fn handle_change(&self, source: &mut KnowledgeSource, event: &ChangeEvent) -> bool {
        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                info!(
                    source_id = %source.id,
                    path = %event.path.display(),
                    kind = ?event.kind,
                    "re-indexing watched source"
                );
                self.update(source).await
            }
            ChangeKind::Deleted => {
                info!(
                    source_id = %source.id,
                    path = %event.path.display(),
                    "watched file deleted; index left untouched"
                );
                true
            }
        }
    }
}


/// Consume watcher events and apply them to a shared source registry.
/// Runs until the event channel closes.
pub async fn drive_updates(
    service: Arc<RagService>,
    registry: Arc<AsyncMutex<HashMap<String, KnowledgeSource>>>,
    mut events: tokio::sync::mpsc::Receiver<ChangeEvent>,
) {
    while let Some(event) = events.recv().await {
        let mut registry = registry.lock().await;
        match registry.get_mut(&event.source_id) {
            Some(source) => {
                service.handle_change(source, &event).await;
            }
            None => {
                warn!(source_id = %event.source_id, "change event for unknown source");
            }
        }
    }
}
