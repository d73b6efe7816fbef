//! Query-time retrieval: embed, search, rerank, normalize.
//!
//! The rank score is `1 / (distance + ε)`, which preserves the search
//! ordering while spreading close distances apart. Scores are then
//! min-max normalized into [0, 1] over the kept set; when all raw scores
//! are equal the denominator is taken as 1.0, so every hit normalizes
//! to 0.0 rather than dividing by zero.
//!
//! When nothing is retrieved the result carries the sentinel marker as
//! its context; downstream stages branch on that marker, never on an
//! empty string.

use crate::cache::EmbeddingCache;
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::TriageError;
use crate::index::VectorIndex;
use crate::models::{RetrievalResult, RetrievedChunk};

/// Marker placed in `RetrievalResult::context` when retrieval found
/// nothing usable. Deliberately not a natural-language phrase.
pub const NO_CONTEXT_FOUND: &str = "NO_CONTEXT_FOUND";

/// Visible separator between chunk texts in the joined context.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

const RERANK_EPSILON: f64 = 1e-6;

/// Retrieve and rank context for one query against a loaded index.
pub async fn retrieve(
    config: &RetrievalConfig,
    cache: &EmbeddingCache,
    provider: &dyn EmbeddingProvider,
    index: &VectorIndex,
    query: &str,
) -> Result<RetrievalResult, TriageError> {
    if index.is_empty() {
        return Ok(empty_result());
    }

    let query_vec = cache.get_or_compute(provider, query, None).await?;

    let nearest = index.search(&query_vec, config.top_k);
    if nearest.is_empty() {
        return Ok(empty_result());
    }

    // Distance → rank score, descending.
    let mut ranked: Vec<(usize, f64)> = nearest
        .into_iter()
        .map(|(i, dist)| (i, 1.0 / (dist + RERANK_EPSILON)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(config.rerank_top_n);

    let scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();
    let normalized = normalize_scores(&scores);

    let hits: Vec<RetrievedChunk> = ranked
        .iter()
        .zip(normalized.iter())
        .map(|(&(i, _), &score)| {
            let entry = index.entry(i);
            RetrievedChunk {
                text: entry.chunk.text.clone(),
                source: entry.chunk.source.clone(),
                category: entry.chunk.category.clone(),
                score,
            }
        })
        .collect();

    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let similarity_score = hits.iter().map(|h| h.score).fold(0.0, f64::max);

    tracing::debug!(
        hits = hits.len(),
        similarity = similarity_score,
        "retrieval complete"
    );

    Ok(RetrievalResult {
        hits,
        context,
        similarity_score,
    })
}

fn empty_result() -> RetrievalResult {
    RetrievalResult {
        hits: Vec::new(),
        context: NO_CONTEXT_FOUND.to_string(),
        similarity_score: 0.0,
    }
}

/// Min-max normalize raw rank scores into [0, 1]. All-equal inputs map
/// to 0.0 (the denominator falls back to 1.0).
fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let denom = if (max - min).abs() < f64::EPSILON {
        1.0
    } else {
        max - min
    };

    scores.iter().map(|s| (s - min) / denom).collect()
}
