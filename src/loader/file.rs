//! Local file and folder loading.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::extract::{self, Capability};
use crate::models::RawDocument;

/// File extensions picked up by folder and repository scans.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".rst", ".py", ".js", ".java", ".cpp", ".c", ".h", ".php", ".rb", ".go", ".rs",
    ".swift", ".kt", ".scala", ".sh", ".sql", ".r", ".m", ".html", ".css", ".json", ".xml", ".csv",
    ".yaml", ".yml", ".pdf", ".docx", ".doc",
];

/// Directories never worth indexing.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Lowercased extension including the dot, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Load a single file, extracting text from binary formats where possible.
/// Unreadable, empty, and unsupported-binary files yield `None`. `docs` is
/// the extraction capability cached at loader construction; anything short
/// of `Available` skips binary documents without reading them.
pub fn load_file(path: &Path, docs: Capability) -> Option<RawDocument> {
    if !path.is_file() {
        warn!(path = %path.display(), "file does not exist");
        return None;
    }
    let extension = extension_of(path);
    if matches!(extension.as_str(), ".pdf" | ".docx" | ".doc") && docs != Capability::Available {
        warn!(path = %path.display(), "binary document skipped: extraction missing from this build");
        return None;
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read file");
            return None;
        }
    };
    let size = bytes.len();

    let text = if matches!(extension.as_str(), ".pdf" | ".docx" | ".doc") {
        match extract::extract_text(&bytes, &extension) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "document extraction failed");
                return None;
            }
        }
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    if text.trim().is_empty() {
        debug!(path = %path.display(), "skipping empty file");
        return None;
    }

    Some(RawDocument {
        text,
        path: path.display().to_string(),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_type: extension,
        size,
        title: None,
    })
}

/// Recursively load every supported file under `root`, skipping VCS and
/// build directories.
pub fn load_folder(root: &Path, docs: Capability) -> Vec<RawDocument> {
    if !root.is_dir() {
        warn!(path = %root.display(), "folder does not exist");
        return Vec::new();
    }
    let excludes = build_exclude_set();

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "walk error");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(excludes) = &excludes {
            if excludes.is_match(path) {
                continue;
            }
        }
        if !is_supported(path) {
            continue;
        }
        if let Some(doc) = load_file(path, docs) {
            documents.push(doc);
        }
    }
    debug!(root = %root.display(), count = documents.len(), "folder scan complete");
    documents
}

fn build_exclude_set() -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES {
        builder.add(Glob::new(pattern).ok()?);
    }
    builder.build().ok()
}
