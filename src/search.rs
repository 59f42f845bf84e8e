//! Retrieval with relevance re-ranking.
//!
//! The store is over-fetched (`2 * k` candidates, capped by config) and the
//! candidates are re-scored with cheap lexical signals on top of vector
//! similarity:
//!
//! ```text
//! relevance = similarity
//!           + 0.2 * |query_words ∩ chunk_words| / |query_words|
//!           + 0.1 if the query names the result's content type
//! ```
//!
//! clamped to 1.0. The type bonus fires when the query mentions "code" and
//! the chunk is code, or mentions "documentation" and the chunk is
//! documentation. Sorting is stable, so equal scores keep store order.

use std::collections::HashSet;

use crate::config::RetrievalConfig;
use crate::error::EngineError;
use crate::gateway::VectorGateway;
use crate::models::{ContentType, SearchResult};
use crate::store::QueryFilter;

/// Combine vector similarity with keyword overlap and a content-type bonus.
pub fn relevance_score(
    query: &str,
    content: &str,
    content_type: ContentType,
    similarity: f64,
) -> f64 {
    let mut score = similarity;

    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    if !query_words.is_empty() {
        let content_lower = content.to_lowercase();
        let content_words: HashSet<&str> = content_lower.split_whitespace().collect();
        let overlap = query_words.intersection(&content_words).count();
        score += 0.2 * overlap as f64 / query_words.len() as f64;
    }

    if query_lower.contains("code") && content_type == ContentType::Code {
        score += 0.1;
    } else if query_lower.contains("documentation") && content_type == ContentType::Documentation {
        score += 0.1;
    }

    score.min(1.0)
}

/// Run a similarity search and return the top `k` re-ranked results.
pub async fn search_similar(
    gateway: &VectorGateway,
    config: &RetrievalConfig,
    query: &str,
    k: usize,
    content_type: Option<ContentType>,
    source_id: Option<&str>,
) -> Result<Vec<SearchResult>, EngineError> {
    let query_vector = gateway.embed_query(query).await?;

    let candidate_k = (k * 2).min(config.candidate_cap);
    let filter = QueryFilter {
        content_type,
        source_id: source_id.map(str::to_string),
    };
    let hits = gateway.query(&query_vector, candidate_k, &filter).await?;

    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .map(|hit| {
            let similarity = 1.0 - hit.distance;
            let relevance = relevance_score(query, &hit.text, hit.metadata.content_type, similarity);
            SearchResult {
                text: hit.text,
                metadata: hit.metadata,
                similarity,
                relevance,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(k);
    Ok(results)
}
