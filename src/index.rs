//! In-memory vector index over the persisted knowledge base.
//!
//! The index is a flat list of (chunk, unit-length embedding) pairs loaded
//! from the `kb_chunks` rows of the current generation. Search is an
//! exhaustive cosine scan (dot product on unit vectors) returning a
//! distance `1 - cos`, so lower means more similar.
//!
//! [`IndexHandle`] enforces the single-writer/many-reader discipline:
//! readers clone the current `Arc` and keep using it while an ingest
//! builds the next generation; the swap is atomic from their point of
//! view.

use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};

use crate::embedding;
use crate::error::TriageError;
use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Immutable (until rebuilt) collection of indexed chunks.
#[derive(Debug)]
pub struct VectorIndex {
    generation: i64,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(generation: i64, entries: Vec<IndexedChunk>) -> Self {
        Self { generation, entries }
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &IndexedChunk {
        &self.entries[idx]
    }

    /// Return the `k` nearest entries as `(entry index, distance)` pairs,
    /// closest first. Distance is `1 - cosine`; with unit vectors on both
    /// sides this is in [0, 2].
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let cos = embedding::cosine_similarity(query, &e.embedding) as f64;
                (i, 1.0 - cos)
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Load the currently-served generation from the database.
/// Returns `IndexUnavailable` when no generation was ever built.
pub async fn load_current(pool: &SqlitePool) -> Result<VectorIndex, TriageError> {
    let generation: Option<i64> =
        sqlx::query_scalar("SELECT current_generation FROM index_meta WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    let generation = generation.ok_or(TriageError::IndexUnavailable)?;

    let rows = sqlx::query(
        r#"
        SELECT id, source, category, chunk_index, text, hash, embedding
        FROM kb_chunks
        WHERE generation = ?
        ORDER BY source, chunk_index
        "#,
    )
    .bind(generation)
    .fetch_all(pool)
    .await?;

    let entries: Vec<IndexedChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            IndexedChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    source: row.get("source"),
                    category: row.get("category"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                embedding: embedding::blob_to_vec(&blob),
            }
        })
        .collect();

    Ok(VectorIndex::new(generation, entries))
}

/// Shared handle to the live index. One writer (ingest) swaps in a new
/// generation; any number of readers hold `Arc`s to whichever generation
/// was current when they started.
pub struct IndexHandle {
    inner: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn with_index(index: VectorIndex) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(index))),
        }
    }

    /// Current index, or `IndexUnavailable` if none was ever built.
    pub fn current(&self) -> Result<Arc<VectorIndex>, TriageError> {
        self.inner
            .read()
            .map_err(|_| TriageError::Other(anyhow::anyhow!("index lock poisoned")))?
            .clone()
            .ok_or(TriageError::IndexUnavailable)
    }

    /// Atomically replace the served index with a newly-built generation.
    pub fn swap(&self, index: VectorIndex) -> Result<(), TriageError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| TriageError::Other(anyhow::anyhow!("index lock poisoned")))?;
        tracing::info!(
            generation = index.generation(),
            chunks = index.len(),
            "swapping in new index generation"
        );
        *guard = Some(Arc::new(index));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                id: text.to_string(),
                source: "a.txt".to_string(),
                category: "faq".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            embedding,
        }
    }

    #[test]
    fn search_orders_by_distance() {
        let index = VectorIndex::new(
            1,
            vec![
                indexed("opposite", vec![-1.0, 0.0]),
                indexed("same", vec![1.0, 0.0]),
                indexed("orthogonal", vec![0.0, 1.0]),
            ],
        );

        let results = index.search(&[1.0, 0.0], 3);
        assert_eq!(results.len(), 3);
        assert_eq!(index.entry(results[0].0).chunk.text, "same");
        assert!(results[0].1 < 1e-6);
        assert_eq!(index.entry(results[1].0).chunk.text, "orthogonal");
        assert_eq!(index.entry(results[2].0).chunk.text, "opposite");
        assert!(results[2].1 > 1.9);
    }

    #[test]
    fn search_truncates_to_k() {
        let index = VectorIndex::new(
            1,
            vec![
                indexed("a", vec![1.0, 0.0]),
                indexed("b", vec![0.9, 0.1]),
                indexed("c", vec![0.0, 1.0]),
            ],
        );
        assert_eq!(index.search(&[1.0, 0.0], 2).len(), 2);
    }

    #[test]
    fn empty_index_returns_no_results() {
        let index = VectorIndex::new(1, Vec::new());
        assert!(index.search(&[1.0, 0.0], 4).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn handle_without_index_is_unavailable() {
        let handle = IndexHandle::empty();
        assert!(matches!(handle.current(), Err(TriageError::IndexUnavailable)));
    }

    #[test]
    fn readers_keep_old_generation_across_swap() {
        let handle = IndexHandle::with_index(VectorIndex::new(1, Vec::new()));
        let reader = handle.current().unwrap();
        assert_eq!(reader.generation(), 1);

        handle
            .swap(VectorIndex::new(2, vec![indexed("x", vec![1.0])]))
            .unwrap();

        // The old Arc is still valid; new readers see generation 2.
        assert_eq!(reader.generation(), 1);
        assert_eq!(handle.current().unwrap().generation(), 2);
    }
}
