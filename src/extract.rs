//! Text extraction from binary document formats (PDF, Word).
//!
//! Extraction is routed by file extension. PDF text comes from `pdf-extract`;
//! `.docx` files are unpacked as OOXML and the `w:t` runs of
//! `word/document.xml` are concatenated. Both paths sit behind the
//! `doc-extract` feature: with the feature off the loaders still run, but
//! binary documents are reported as degraded and skipped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("document extraction disabled at build time")]
    Disabled,

    #[error("pdf extraction failed: {0}")]
    Pdf(String),

    #[error("ooxml extraction failed: {0}")]
    Ooxml(String),
}

/// What an adapter (or this module) can do in the current build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Available,
    /// Partially working: an adapter whose extraction backend is missing
    /// still loads plain text but skips binary documents.
    Degraded,
    Unavailable,
}

/// Extraction capability of this build. Callers probe this once at
/// construction and cache the result instead of re-checking per file.
pub fn capability() -> Capability {
    if cfg!(feature = "doc-extract") {
        Capability::Available
    } else {
        Capability::Unavailable
    }
}

/// Extract plain text from a binary document. `extension` is the lowercased
/// extension including the dot.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        ".pdf" => extract_pdf(bytes),
        ".docx" | ".doc" => extract_docx(bytes),
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

#[cfg(feature = "doc-extract")]
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(not(feature = "doc-extract"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::Disabled)
}

#[cfg(feature = "doc-extract")]
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;
    use std::io::Read;

    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(format!("missing word/document.xml: {e}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:t" => in_text_run = false,
            // Paragraph ends become line breaks so chunking sees structure.
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:p" => out.push('\n'),
            Ok(Event::Text(t)) if in_text_run => {
                let text = t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(not(feature = "doc-extract"))]
fn extract_docx(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::Disabled)
}
