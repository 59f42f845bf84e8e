//! Source loaders: one adapter per [`SourceKind`], all normalizing to
//! [`RawDocument`].
//!
//! Loading is fail-soft. A broken file, an unreachable page, or a failed
//! clone is logged and skipped; the pipeline decides what an empty result
//! means for the source's status. Loaders never touch the vector store.

pub mod drive;
pub mod file;
pub mod repo;
pub mod web;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::{EngineConfig, RepoConfig};
use crate::extract::{self, Capability};
use crate::models::{KnowledgeSource, RawDocument, SourceKind};

pub use drive::DriveProvider;
pub use web::WebLoader;

/// Dispatches a [`KnowledgeSource`] to the adapter for its kind.
pub struct SourceLoader {
    web: WebLoader,
    drive: Option<Arc<dyn DriveProvider>>,
    repo: RepoConfig,
    docs: Capability,
}

impl SourceLoader {
    /// `drive` is optional: without a provider, Drive sources load nothing
    /// and log why.
    pub fn new(config: &EngineConfig, drive: Option<Arc<dyn DriveProvider>>) -> Result<Self> {
        // Probed once here; per-file loads reuse the cached answer. A build
        // without extraction leaves the file adapters degraded to text-only
        // rather than unavailable.
        let docs = match extract::capability() {
            Capability::Available => Capability::Available,
            Capability::Degraded | Capability::Unavailable => Capability::Degraded,
        };
        Ok(Self {
            web: WebLoader::new(&config.web)?,
            drive,
            repo: config.repo.clone(),
            docs,
        })
    }

    /// Cached extraction capability: `Degraded` means binary documents
    /// (PDF, Word) are skipped and only plain text loads.
    pub fn docs_capability(&self) -> Capability {
        self.docs
    }

    pub async fn load(&self, source: &KnowledgeSource) -> Vec<RawDocument> {
        match source.kind {
            SourceKind::LocalFile => file::load_file(Path::new(&source.path), self.docs)
                .into_iter()
                .collect(),
            SourceKind::LocalFolder => file::load_folder(Path::new(&source.path), self.docs),
            SourceKind::RemoteRepo => repo::load_repo(&self.repo, &source.path, self.docs),
            SourceKind::DriveFolder => drive::load_folder(self.drive.as_deref(), &source.path).await,
            SourceKind::Url => self.web.load_single(&source.path).await,
            SourceKind::Website => {
                self.web
                    .crawl(
                        &source.path,
                        source.settings.max_pages,
                        source.settings.same_domain_only,
                    )
                    .await
            }
            SourceKind::Sitemap => {
                self.web
                    .from_sitemap(&source.path, source.settings.max_pages)
                    .await
            }
        }
    }

    /// Cheap reachability probe for URL-backed sources.
    pub async fn validate_url(&self, url: &str) -> bool {
        self.web.validate(url).await
    }
}
