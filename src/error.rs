//! Error types shared across the ingestion and retrieval pipeline.

use thiserror::Error;

/// Failures surfaced by the embedding gateway and the indexing pipeline.
///
/// `Unavailable` is kept distinct from the other variants so callers can tell
/// "the backend is not provisioned" apart from "the backend failed": sources
/// hitting the former get a stable, user-facing status message instead of a
/// transport error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not available")]
    Unavailable(&'static str),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store failure: {0}")]
    Store(String),

    #[error("no documents loaded")]
    NoDocuments,

    #[error("no chunks created")]
    NoChunks,
}
