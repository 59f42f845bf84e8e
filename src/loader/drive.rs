//! Google Drive folder loading.
//!
//! The Drive API client itself lives behind [`DriveProvider`], implemented
//! by the host application (which owns OAuth flows and token storage).
//! This module supplies the provider-independent pieces: folder-id parsing,
//! the exportable MIME allow-list, and text decoding of downloaded files.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::extract::{self, Capability};
use crate::models::RawDocument;

/// Host-side Drive integration. `auth_required` is invoked when a load is
/// attempted without valid credentials so the host can prompt the user.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn auth_required(&self) {}

    /// List and download every supported file in the folder.
    async fn process_folder(&self, folder_id: &str) -> Result<Vec<RawDocument>>;
}

pub async fn load_folder(provider: Option<&dyn DriveProvider>, url: &str) -> Vec<RawDocument> {
    let Some(provider) = provider else {
        warn!(url, "no Drive provider configured");
        return Vec::new();
    };
    if !provider.is_authenticated() {
        warn!(url, "Drive provider not authenticated");
        provider.auth_required();
        return Vec::new();
    }
    let Some(folder_id) = extract_folder_id(url) else {
        warn!(url, "could not determine Drive folder id");
        return Vec::new();
    };
    match provider.process_folder(&folder_id).await {
        Ok(documents) => documents,
        Err(e) => {
            warn!(url, error = %e, "Drive folder load failed");
            Vec::new()
        }
    }
}

/// Pull the folder id out of a Drive URL. Accepts `/folders/<id>` paths,
/// `id=<id>` query params, and bare ids.
pub fn extract_folder_id(url: &str) -> Option<String> {
    if let Some(rest) = url.split("/folders/").nth(1) {
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !id.is_empty() {
            return Some(id);
        }
    }
    // The `id` query parameter, matched as a whole key so `gid=`/`uid=`
    // never qualify.
    for segment in url.split(&['?', '&', '#'][..]) {
        if let Some(value) = segment.strip_prefix("id=") {
            let id: String = value
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    // Bare folder id.
    if !url.is_empty()
        && url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Some(url.to_string());
    }
    None
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// For Google-native formats, the MIME type to export as. `None` means the
/// file is downloaded as-is.
pub fn export_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "application/vnd.google-apps.document" => Some(DOCX_MIME),
        "application/vnd.google-apps.spreadsheet" => Some("text/csv"),
        "application/vnd.google-apps.presentation" => Some(PPTX_MIME),
        _ => None,
    }
}

/// Whether a Drive file of this MIME type is worth downloading at all.
pub fn is_supported_mime(mime: &str) -> bool {
    export_mime(mime).is_some()
        || matches!(
            mime,
            "application/pdf"
                | "application/msword"
                | "text/plain"
                | "text/csv"
                | "text/html"
                | "text/markdown"
        )
        || mime == DOCX_MIME
}

/// Local extension assigned to a downloaded Drive file, driving both
/// content-type classification and chunking policy.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "text/html" => ".html",
        "text/markdown" => ".md",
        "application/vnd.google-apps.document" => ".docx",
        "application/vnd.google-apps.spreadsheet" => ".csv",
        "application/vnd.google-apps.presentation" => ".pptx",
        m if m == DOCX_MIME => ".docx",
        m if m == PPTX_MIME => ".pptx",
        _ => ".txt",
    }
}

/// Decode downloaded bytes into text. Binary document formats go through
/// the extraction layer; everything else is treated as UTF-8. `docs` is the
/// extraction capability the host cached when it built its provider;
/// anything short of `Available` skips binary documents.
pub fn decode_document(bytes: &[u8], extension: &str, docs: Capability) -> Option<String> {
    let text = if matches!(extension, ".pdf" | ".docx" | ".doc") {
        if docs != Capability::Available {
            warn!(extension, "binary Drive document skipped: extraction missing from this build");
            return None;
        }
        match extract::extract_text(bytes, extension) {
            Ok(text) => text,
            Err(e) => {
                warn!(extension, error = %e, "failed to extract Drive document");
                return None;
            }
        }
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
