//! Core data types: knowledge sources, loaded documents, and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extensions that map to the `code` content type.
pub const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".java", ".cpp", ".c", ".h", ".php", ".rb", ".go", ".rs",
];

/// What kind of thing a knowledge source points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalFile,
    LocalFolder,
    RemoteRepo,
    DriveFolder,
    Url,
    Website,
    Sitemap,
}

impl SourceKind {
    /// Only local sources can be watched for filesystem changes.
    pub fn supports_monitoring(&self) -> bool {
        matches!(self, SourceKind::LocalFile | SourceKind::LocalFolder)
    }
}

/// Lifecycle state of a source. `Monitoring` is orthogonal to indexing:
/// a watched source re-enters `Processing` on every change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Processing,
    Indexed,
    Error,
    Monitoring,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Processing => "processing",
            SourceStatus::Indexed => "indexed",
            SourceStatus::Error => "error",
            SourceStatus::Monitoring => "monitoring",
        }
    }
}

/// Per-source knobs that only apply to web sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub max_pages: usize,
    pub same_domain_only: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            max_pages: 10,
            same_domain_only: true,
        }
    }
}

/// A registered source of documents plus its indexing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    /// Path, URL, or folder reference depending on `kind`.
    pub path: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: SourceSettings,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl KnowledgeSource {
    pub fn new(id: impl Into<String>, path: impl Into<String>, kind: SourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            path: path.into(),
            kind,
            status: SourceStatus::Pending,
            name: String::new(),
            description: None,
            settings: SourceSettings::default(),
            file_count: 0,
            chunk_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            indexed_at: None,
        }
    }

    /// Transition to `status`, stamping `updated_at` and, on success,
    /// `indexed_at`. The error message is cleared unless one is supplied.
    pub fn update_status(&mut self, status: SourceStatus, error: Option<String>) {
        self.status = status;
        self.error_message = error;
        self.updated_at = Utc::now();
        if status == SourceStatus::Indexed {
            self.indexed_at = Some(self.updated_at);
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, SourceStatus::Indexed | SourceStatus::Monitoring)
    }

    pub fn has_error(&self) -> bool {
        self.status == SourceStatus::Error
    }

    /// Human-readable label for UIs and logs.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match self.kind {
            SourceKind::LocalFile => std::path::Path::new(&self.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.clone()),
            SourceKind::LocalFolder => format!("Folder: {}", self.path),
            SourceKind::RemoteRepo => {
                let tail = self
                    .path
                    .trim_end_matches('/')
                    .trim_end_matches(".git")
                    .rsplit('/')
                    .next()
                    .unwrap_or(&self.path);
                format!("Repo: {tail}")
            }
            SourceKind::DriveFolder => format!("Drive: {}", self.path),
            _ => self.path.clone(),
        }
    }
}

/// A document as produced by a loader, before chunking.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub text: String,
    /// Filesystem path or URL of origin.
    pub path: String,
    pub filename: String,
    /// Lowercased extension including the dot, e.g. ".md". Web pages use
    /// ".html".
    pub file_type: String,
    pub size: usize,
    pub title: Option<String>,
}

/// Coarse classification attached to every chunk, derived from the file
/// extension. Used both for filtered retrieval and for the relevance
/// ranker's type bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Documentation,
    Document,
    Data,
    Text,
}

impl ContentType {
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.to_lowercase();
        if CODE_EXTENSIONS.contains(&ext.as_str()) {
            ContentType::Code
        } else if matches!(ext.as_str(), ".md" | ".rst" | ".txt") {
            ContentType::Documentation
        } else if matches!(ext.as_str(), ".pdf" | ".docx" | ".doc") {
            ContentType::Document
        } else if matches!(ext.as_str(), ".json" | ".xml" | ".yml" | ".yaml") {
            ContentType::Data
        } else {
            ContentType::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::Documentation => "documentation",
            ContentType::Document => "document",
            ContentType::Data => "data",
            ContentType::Text => "text",
        }
    }
}

/// Metadata carried with every stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    /// Position of the chunk within its source, monotonic across the whole
    /// indexing run.
    pub chunk_index: i64,
    pub content_type: ContentType,
    pub filename: String,
    pub file_type: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// One ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Raw vector similarity in `[0, 1]`.
    pub similarity: f64,
    /// Similarity plus keyword and content-type bonuses, clamped to 1.0.
    pub relevance: f64,
}
