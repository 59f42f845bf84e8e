//! Filesystem change monitoring for local sources.
//!
//! Wraps a `notify` recommended watcher. Events are filtered down to files
//! with indexable extensions belonging to a watched source, translated to
//! [`ChangeEvent`], and pushed into a bounded tokio channel. The consumer
//! (see `service::drive_updates`) decides what a change means; this module
//! never touches the index.
//!
//! Single-file sources watch their parent directory with a filename
//! filter, since most editors replace files rather than modify them in
//! place.

use anyhow::{bail, Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{KnowledgeSource, SourceKind, SourceStatus};

/// Extensions worth reacting to; everything else (editor swap files,
/// build output) is noise.
pub const MONITORED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".rst", ".py", ".js", ".html", ".css", ".json", ".xml", ".csv", ".yaml",
    ".yml", ".pdf", ".docx", ".doc", ".rs", ".go", ".java", ".rb",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub source_id: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

struct WatchedSource {
    root: PathBuf,
    /// Set for single-file sources: only events on this filename pass.
    file_filter: Option<OsString>,
}

pub struct FsWatcher {
    watcher: Mutex<notify::RecommendedWatcher>,
    watched: Arc<Mutex<HashMap<String, WatchedSource>>>,
}

impl FsWatcher {
    /// Build a watcher and the channel its events arrive on. `capacity`
    /// bounds the channel; bursts beyond it are dropped with a warning.
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let watched: Arc<Mutex<HashMap<String, WatchedSource>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let registry = watched.clone();

        let watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "watch error");
                        return;
                    }
                };
                let kind = match event.kind {
                    EventKind::Create(_) => ChangeKind::Created,
                    EventKind::Modify(_) => ChangeKind::Modified,
                    EventKind::Remove(_) => ChangeKind::Deleted,
                    _ => return,
                };
                for path in &event.paths {
                    if !has_monitored_extension(path) {
                        continue;
                    }
                    let registry = registry.lock().unwrap();
                    for (source_id, watched) in registry.iter() {
                        if !path.starts_with(&watched.root) {
                            continue;
                        }
                        if let Some(filter) = &watched.file_filter {
                            if path.file_name() != Some(filter.as_os_str()) {
                                continue;
                            }
                        }
                        let change = ChangeEvent {
                            source_id: source_id.clone(),
                            path: path.clone(),
                            kind,
                        };
                        // Runs on notify's thread; never block it.
                        if tx.try_send(change).is_err() {
                            warn!(path = %path.display(), "change channel full, dropping event");
                        }
                    }
                }
            },
        )
        .context("failed to create filesystem watcher")?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
                watched,
            },
            rx,
        ))
    }

    /// Start watching a local source and mark it `Monitoring`.
    pub fn watch(&self, source: &mut KnowledgeSource) -> Result<()> {
        if !source.kind.supports_monitoring() {
            bail!("source kind {:?} does not support monitoring", source.kind);
        }
        let path = Path::new(&source.path);
        if !path.exists() {
            bail!("cannot watch missing path: {}", source.path);
        }

        let (root, file_filter) = match source.kind {
            SourceKind::LocalFile => {
                let parent = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."));
                (parent.to_path_buf(), path.file_name().map(OsString::from))
            }
            _ => (path.to_path_buf(), None),
        };

        self.watcher
            .lock()
            .unwrap()
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        self.watched.lock().unwrap().insert(
            source.id.clone(),
            WatchedSource { root, file_filter },
        );

        source.update_status(SourceStatus::Monitoring, None);
        info!(source_id = %source.id, path = %source.path, "monitoring started");
        Ok(())
    }

    /// Stop watching. Returns false when the source was not watched.
    pub fn unwatch(&self, source_id: &str) -> bool {
        let removed = self.watched.lock().unwrap().remove(source_id);
        match removed {
            Some(watched) => {
                // Another source may share the root; failing to unwatch it
                // is harmless because events are filtered by the registry.
                if let Err(e) = self.watcher.lock().unwrap().unwatch(&watched.root) {
                    debug!(error = %e, root = %watched.root.display(), "unwatch failed");
                }
                info!(source_id, "monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_watched(&self, source_id: &str) -> bool {
        self.watched.lock().unwrap().contains_key(source_id)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.lock().unwrap().len()
    }
}

fn has_monitored_extension(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    MONITORED_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_monitored_extension_filter() {
        assert!(has_monitored_extension(Path::new("/x/notes.md")));
        assert!(has_monitored_extension(Path::new("/x/NOTES.MD")));
        assert!(!has_monitored_extension(Path::new("/x/image.iso")));
        assert!(!has_monitored_extension(Path::new("/x/noext")));
    }

    #[test]
    fn test_watch_rejects_remote_kinds() {
        let (watcher, _rx) = FsWatcher::new(16).unwrap();
        let mut source =
            KnowledgeSource::new("w1", "https://example.com", SourceKind::Website);
        assert!(watcher.watch(&mut source).is_err());
        assert!(!watcher.is_watched("w1"));
    }

    #[test]
    fn test_watch_rejects_missing_path() {
        let (watcher, _rx) = FsWatcher::new(16).unwrap();
        let mut source = KnowledgeSource::new(
            "w2",
            "/definitely/not/a/real/path",
            SourceKind::LocalFolder,
        );
        assert!(watcher.watch(&mut source).is_err());
    }

    #[tokio::test]
    async fn test_folder_watch_delivers_events() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, mut rx) = FsWatcher::new(16).unwrap();

        let mut source = KnowledgeSource::new(
            "w3",
            dir.path().display().to_string(),
            SourceKind::LocalFolder,
        );
        watcher.watch(&mut source).unwrap();
        assert_eq!(source.status, SourceStatus::Monitoring);
        assert!(watcher.is_watched("w3"));

        std::fs::write(dir.path().join("new.md"), "fresh content").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for change event")
            .expect("channel closed");
        assert_eq!(event.source_id, "w3");
        assert!(matches!(
            event.kind,
            ChangeKind::Created | ChangeKind::Modified
        ));

        assert!(watcher.unwatch("w3"));
        assert!(!watcher.unwatch("w3"));
    }

    #[tokio::test]
    async fn test_file_watch_filters_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("watched.txt");
        std::fs::write(&target, "v1").unwrap();

        let (watcher, mut rx) = FsWatcher::new(16).unwrap();
        let mut source =
            KnowledgeSource::new("w4", target.display().to_string(), SourceKind::LocalFile);
        watcher.watch(&mut source).unwrap();

        // Sibling churn must not produce events for this source.
        std::fs::write(dir.path().join("other.txt"), "noise").unwrap();
        std::fs::write(&target, "v2").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for change event")
            .expect("channel closed");
        assert_eq!(event.source_id, "w4");
        assert_eq!(event.path.file_name().unwrap(), "watched.txt");
    }
}
