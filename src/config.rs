//! Engine configuration, loaded from a TOML file with sensible defaults.
//!
//! Every section can be omitted; a missing config file yields the same
//! settings as an empty one. Tunables that shape retrieval quality
//! (chunk sizes, candidate caps, crawl pacing) all live here rather than
//! being hard-coded at call sites.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub batch: BatchConfig,
    pub web: WebConfig,
    pub repo: RepoConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file. A missing file is not an error;
    /// it simply yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

// ============================================================================
// Chunking
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in bytes.
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks for prose content.
    pub chunk_overlap: usize,
    /// Smaller overlap used for source code, where repeating context is
    /// less useful than for prose.
    pub code_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            code_overlap: 50,
        }
    }
}

// ============================================================================
// Embedding
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// One of: "disabled", "openai", "ollama".
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL for self-hosted providers (Ollama).
    pub url: Option<String>,
    /// Number of chunks embedded and committed per round trip.
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 100,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Retrieval
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned when the caller does not specify a count.
    pub default_k: usize,
    /// Hard cap on candidates fetched for re-ranking. Retrieval over-fetches
    /// `2 * k` candidates up to this cap so the relevance ranker has slack.
    pub candidate_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            candidate_cap: 20,
        }
    }
}

// ============================================================================
// Batch processing
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of sources processed concurrently.
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_workers: 3 }
    }
}

// ============================================================================
// Web fetching
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Politeness delay between page fetches while crawling.
    pub crawl_delay_ms: u64,
    /// Politeness delay between fetches of sitemap-listed pages.
    pub sitemap_delay_ms: u64,
    /// Pages whose readable text is shorter than this are discarded.
    pub min_text_len: usize,
    pub user_agent: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            crawl_delay_ms: 1000,
            sitemap_delay_ms: 500,
            min_text_len: 100,
            user_agent: "knowledge-engine/0.1".to_string(),
        }
    }
}

// ============================================================================
// Repository checkout
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Where cloned repositories are cached. Defaults to a directory under
    /// the system temp dir.
    pub cache_dir: Option<PathBuf>,
    pub branch: String,
    pub shallow: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            branch: "main".to_string(),
            shallow: true,
        }
    }
}

// ============================================================================
// Vector store
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database. `None` selects the in-memory store.
    pub db_path: Option<PathBuf>,
}
