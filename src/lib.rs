//! Local-first RAG engine: ingest heterogeneous knowledge sources, chunk
//! and embed their content, and serve ranked similarity search over the
//! result.
//!
//! ```text
//!  sources                 pipeline                       retrieval
//!  ────────┐   ┌─────────┬──────────┬─────────┐   ┌──────────────────┐
//!  file    │   │ loader  │ chunker  │ gateway │   │ search (re-rank) │
//!  folder  ├──▶│         ├─────────▶│ embed + ├──▶│                  │
//!  repo    │   │         │          │ store   │   └──────────────────┘
//!  drive   │   └─────────┴──────────┴─────────┘
//!  url     │        ▲
//!  crawl   │        │ change events
//!  sitemap │   ┌────┴────┐
//!  ────────┘   │ watcher │
//!              └─────────┘
//! ```
//!
//! | module      | responsibility                                        |
//! |-------------|-------------------------------------------------------|
//! | [`config`]  | TOML configuration with defaults                      |
//! | [`models`]  | sources, documents, content types, search results     |
//! | [`error`]   | pipeline error taxonomy                               |
//! | [`loader`]  | per-kind source adapters (fs, git, Drive, web)        |
//! | [`chunker`] | content-aware recursive splitting with overlap        |
//! | [`extract`] | PDF / Word text extraction                            |
//! | [`embedding`] | provider seam (OpenAI, Ollama) + vector utilities   |
//! | [`store`]   | vector store seam (in-memory, SQLite)                 |
//! | [`gateway`] | batching, deterministic ids, availability             |
//! | [`search`]  | over-fetch + relevance re-ranking                     |
//! | [`service`] | source lifecycle orchestration                        |
//! | [`batch`]   | bounded worker pool over many sources                 |
//! | [`watcher`] | filesystem monitoring for local sources               |
//! | [`progress`] | batch progress reporting                             |
//! | [`logging`] | tracing subscriber helper                             |

pub mod batch;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod loader;
pub mod logging;
pub mod models;
pub mod progress;
pub mod search;
pub mod service;
pub mod store;
pub mod watcher;

pub use config::EngineConfig;
pub use error::EngineError;
pub use models::{ContentType, KnowledgeSource, SearchResult, SourceKind, SourceStatus};
pub use service::RagService;
