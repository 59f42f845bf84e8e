//! End-to-end pipeline tests over the in-memory store with a deterministic
//! embedding provider: ingest, search, update, remove, batch runs, and
//! watcher-driven updates.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use knowledge_engine::batch::{BatchScheduler, JobStatus};
use knowledge_engine::config::EngineConfig;
use knowledge_engine::embedding::{DisabledProvider, EmbeddingProvider};
use knowledge_engine::gateway::VectorGateway;
use knowledge_engine::progress::{ChannelProgress, NoProgress, ProgressEvent};
use knowledge_engine::service::{drive_updates, RagService};
use knowledge_engine::store::memory::InMemoryStore;
use knowledge_engine::store::VectorStore;
use knowledge_engine::watcher::{ChangeEvent, ChangeKind};
use knowledge_engine::{ContentType, EngineError, KnowledgeSource, SourceKind, SourceStatus};

/// Deterministic embedding: words hashed into a 16-dim bag-of-words
/// vector, so texts sharing words are similar and identical texts are
/// identical.
struct WordHashProvider {
    delay: Duration,
}

impl WordHashProvider {
    fn fast() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    fn slow(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; 16];
        for word in text.to_lowercase().split_whitespace() {
            let idx = word.bytes().map(|b| b as usize).sum::<usize>() % 16;
            vector[idx] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for WordHashProvider {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

fn service_with(
    provider: Arc<dyn EmbeddingProvider>,
) -> (Arc<RagService>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let gateway = VectorGateway::new(provider, store.clone(), 100);
    let service = Arc::new(RagService::new(EngineConfig::default(), gateway, None).unwrap());
    (service, store)
}

fn file_source(id: &str, path: &Path) -> KnowledgeSource {
    KnowledgeSource::new(id, path.display().to_string(), SourceKind::LocalFile)
}

#[tokio::test]
async fn test_single_file_ingest_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(
        &path,
        "retry budgets protect upstream services\n\n\
         backoff jitter avoids thundering herds\n\n\
         circuit breakers shed load early",
    )
    .unwrap();

    let (service, _store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut source = file_source("s1", &path);

    assert!(service.process(&mut source).await);
    assert_eq!(source.status, SourceStatus::Indexed);
    assert_eq!(source.file_count, 1);
    assert!(source.chunk_count >= 1);
    assert!(source.indexed_at.is_some());
    assert!(source.error_message.is_none());

    let results = service
        .search_similar("backoff jitter thundering herds", 3, None, None)
        .await;
    assert!(!results.is_empty());
    assert!(results[0].text.contains("jitter"));
    assert!(results[0].relevance >= results[0].similarity);
    // Results are ordered by relevance.
    for pair in results.windows(2) {
        assert!(pair[0].relevance >= pair[1].relevance);
    }
}

#[tokio::test]
async fn test_unavailable_backend_marks_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    std::fs::write(&path, "some content").unwrap();

    let (service, _store) = service_with(Arc::new(DisabledProvider));
    let mut source = file_source("s1", &path);

    assert!(!service.process(&mut source).await);
    assert_eq!(source.status, SourceStatus::Error);
    assert!(source
        .error_message
        .as_deref()
        .unwrap()
        .contains("not available"));

    // Search degrades to empty rather than failing.
    assert!(service.search_similar("anything", 5, None, None).await.is_empty());
}

#[tokio::test]
async fn test_missing_file_reports_no_documents() {
    let (service, _store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut source = file_source("s1", Path::new("/no/such/file.txt"));

    assert!(!service.process(&mut source).await);
    assert_eq!(source.status, SourceStatus::Error);
    assert_eq!(source.error_message.as_deref(), Some("no documents loaded"));
}

#[tokio::test]
async fn test_content_type_filtered_search() {
    let dir = tempfile::tempdir().unwrap();
    let code = dir.path().join("parser.py");
    let docs = dir.path().join("parser.md");
    std::fs::write(&code, "def parse(tokens): return tree").unwrap();
    std::fs::write(&docs, "the parser turns tokens into a tree").unwrap();

    let (service, _store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut code_source = file_source("code", &code);
    let mut docs_source = file_source("docs", &docs);
    assert!(service.process(&mut code_source).await);
    assert!(service.process(&mut docs_source).await);

    let results = service
        .search_similar("parse tokens tree", 5, Some(ContentType::Code), None)
        .await;
    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.metadata.content_type, ContentType::Code);
        assert_eq!(result.metadata.filename, "parser.py");
    }

    let scoped = service
        .search_similar("parse tokens tree", 5, None, Some("docs"))
        .await;
    assert!(scoped.iter().all(|r| r.metadata.source_id == "docs"));
}

#[tokio::test]
async fn test_remove_is_scoped_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    std::fs::write(&a, "alpha content for source a").unwrap();
    std::fs::write(&b, "bravo content for source b").unwrap();

    let (service, store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut source_a = file_source("a", &a);
    let mut source_b = file_source("b", &b);
    assert!(service.process(&mut source_a).await);
    assert!(service.process(&mut source_b).await);

    assert!(service.remove("a").await);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.source_count, 1);
    assert_eq!(stats.total_chunks as usize, source_b.chunk_count);

    // Unknown ids succeed without touching anything.
    assert!(service.remove("never-existed").await);
    assert_eq!(store.stats().await.unwrap().source_count, 1);
}

#[tokio::test]
async fn test_update_replaces_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    std::fs::write(&path, "ancient first revision").unwrap();

    let (service, store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut source = file_source("s1", &path);
    assert!(service.process(&mut source).await);

    std::fs::write(&path, "shiny second revision").unwrap();
    assert!(service.update(&mut source).await);
    assert_eq!(source.status, SourceStatus::Indexed);

    // No duplicate chunks after update.
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_chunks as usize, source.chunk_count);

    let results = service.search_similar("shiny second revision", 3, None, None).await;
    assert!(results[0].text.contains("second revision"));
}

#[tokio::test]
async fn test_reindex_all() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.md");
    let b = dir.path().join("b.md");
    std::fs::write(&a, "first document body").unwrap();
    std::fs::write(&b, "second document body").unwrap();

    let (service, store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut sources = vec![file_source("a", &a), file_source("b", &b)];
    assert!(service.process(&mut sources[0]).await);

    let results = service.reindex_all(&mut sources).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results.get("a"), Some(&true));
    assert_eq!(results.get("b"), Some(&true));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.source_count, 2);
    let expected: usize = sources.iter().map(|s| s.chunk_count).sum();
    assert_eq!(stats.total_chunks as usize, expected);
}

fn batch_sources(dir: &Path, n: usize) -> Vec<KnowledgeSource> {
    (0..n)
        .map(|i| {
            let path = dir.join(format!("doc{i}.txt"));
            std::fs::write(&path, format!("document number {i} with some body text")).unwrap();
            file_source(&format!("batch-{i}"), &path)
        })
        .collect()
}

#[tokio::test]
async fn test_batch_processes_every_source() {
    let dir = tempfile::tempdir().unwrap();
    let (service, store) = service_with(Arc::new(WordHashProvider::slow(30)));

    let (reporter, mut events) = ChannelProgress::new(256);
    let scheduler = BatchScheduler::new(service, 2, Arc::new(reporter));

    assert!(scheduler.submit(batch_sources(dir.path(), 5)));
    // A second batch is rejected while the first is in flight.
    assert!(!scheduler.submit(batch_sources(dir.path(), 1)));

    scheduler.wait().await;
    assert!(!scheduler.is_running());

    let stats = scheduler.statistics();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.failed + stats.cancelled + stats.pending + stats.running, 0);

    for job in scheduler.jobs() {
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert!(job.started_at.is_some() && job.finished_at.is_some());
        assert_eq!(job.source.status, SourceStatus::Indexed);
    }

    // The aggregate counter reached (5, 5).
    let mut last_batch_progress = None;
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::BatchProgress { completed, total } = event {
            last_batch_progress = Some((completed, total));
        }
    }
    assert_eq!(last_batch_progress, Some((5, 5)));

    assert_eq!(store.stats().await.unwrap().source_count, 5);
    assert_eq!(scheduler.clear_finished(), 5);
    assert_eq!(scheduler.statistics().total, 0);
}

#[tokio::test]
async fn test_batch_cancellation_is_cooperative() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _store) = service_with(Arc::new(WordHashProvider::slow(100)));
    let scheduler = BatchScheduler::new(service, 1, Arc::new(NoProgress));

    assert!(scheduler.submit(batch_sources(dir.path(), 6)));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(scheduler.cancel());
    scheduler.wait().await;

    let stats = scheduler.statistics();
    assert_eq!(stats.total, 6);
    assert_eq!(stats.pending + stats.running, 0);
    assert!(stats.cancelled >= 1, "expected cancelled jobs, got {stats:?}");
    assert_eq!(stats.completed + stats.failed + stats.cancelled, 6);

    // Cancelled jobs are terminal with timestamps.
    for job in scheduler.jobs() {
        assert!(job.status.is_terminal());
        if job.status == JobStatus::Cancelled {
            assert!(job.finished_at.is_some());
        }
    }
}

#[tokio::test]
async fn test_engine_built_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.store.db_path = Some(dir.path().join("index.db"));

    // Default provider is "disabled": the engine constructs, reports the
    // backend unavailable, and search degrades to empty.
    let service = RagService::from_config(config, None).await.unwrap();
    assert!(service.search("anything").await.is_empty());

    let path = dir.path().join("doc.txt");
    std::fs::write(&path, "content").unwrap();
    let mut source = file_source("s1", &path);
    assert!(!service.process(&mut source).await);
    assert_eq!(source.status, SourceStatus::Error);
}

#[tokio::test]
async fn test_change_events_drive_reindexing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched.md");
    std::fs::write(&path, "initial watched content").unwrap();

    let (service, store) = service_with(Arc::new(WordHashProvider::fast()));
    let mut source = file_source("w1", &path);
    assert!(service.process(&mut source).await);
    let registry = Arc::new(AsyncMutex::new(HashMap::from([(
        source.id.clone(),
        source,
    )])));

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let consumer = tokio::spawn(drive_updates(service.clone(), registry.clone(), rx));

    std::fs::write(&path, "rewritten watched content").unwrap();
    tx.send(ChangeEvent {
        source_id: "w1".to_string(),
        path: path.clone(),
        kind: ChangeKind::Modified,
    })
    .await
    .unwrap();

    // Deletion events are observed but leave the index alone.
    tx.send(ChangeEvent {
        source_id: "w1".to_string(),
        path: path.clone(),
        kind: ChangeKind::Deleted,
    })
    .await
    .unwrap();
    drop(tx);
    consumer.await.unwrap();

    let registry = registry.lock().await;
    let source = registry.get("w1").unwrap();
    assert_eq!(source.status, SourceStatus::Indexed);

    let results = service
        .search_similar("rewritten watched content", 3, None, None)
        .await;
    assert!(results[0].text.contains("rewritten"));
    assert_eq!(
        store.stats().await.unwrap().total_chunks as usize,
        source.chunk_count
    );
}
