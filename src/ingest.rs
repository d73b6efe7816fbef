//! Index build pipeline: corpus scan → extraction → chunking → embedding
//! → atomic generation swap.
//!
//! A rebuild writes a complete new generation of `kb_chunks` rows and
//! flips `index_meta.current_generation` inside one transaction, then
//! deletes prior generations. Readers never observe a partial index: they
//! either see the old generation or the new one. A corpus that produces
//! zero chunks aborts the rebuild and leaves the previous index in place.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::cache::EmbeddingCache;
use crate::chunker::chunk_document;
use crate::config::Config;
use crate::corpus;
use crate::embedding;
use crate::error::TriageError;
use crate::extract;
use crate::models::Chunk;

/// Outcome of one ingest run.
#[derive(Debug)]
pub struct IngestReport {
    pub documents: usize,
    pub skipped: usize,
    pub chunk_count: u64,
    pub generation: i64,
}

/// Rebuild the vector index from the configured corpus.
///
/// Idempotent: re-ingesting the same corpus produces the same chunk
/// count. With `dry_run`, counts are computed and nothing is written.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    dry_run: bool,
) -> Result<IngestReport, TriageError> {
    let entries = corpus::scan_corpus(config)?;

    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut documents = 0usize;
    let mut skipped = 0usize;

    for entry in &entries {
        let text = match extract::extract_text(entry, config).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %entry.relative, error = %e, "skipping document");
                skipped += 1;
                continue;
            }
        };

        let chunks = chunk_document(
            &entry.relative,
            &entry.category,
            &text,
            config.chunking.chunk_words,
            config.chunking.overlap_words,
        );
        if chunks.is_empty() {
            skipped += 1;
            continue;
        }

        documents += 1;
        all_chunks.extend(chunks);
    }

    if all_chunks.is_empty() {
        return Err(TriageError::EmptyCorpus {
            path: config.corpus.root.clone(),
        });
    }

    let chunk_count = all_chunks.len() as u64;

    if dry_run {
        return Ok(IngestReport {
            documents,
            skipped,
            chunk_count,
            generation: current_generation(pool).await?.unwrap_or(0),
        });
    }

    // Embed every chunk through the cache; identical text across rebuilds
    // is a cache hit, not a recomputation.
    let provider = embedding::create_provider(&config.embedding).map_err(TriageError::Other)?;
    let cache = EmbeddingCache::new(pool.clone(), config.embedding.clone(), &config.cache);

    // Batches are split at source-file boundaries so every cache entry
    // carries the right invalidation tag.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(all_chunks.len());
    let mut start = 0usize;
    while start < all_chunks.len() {
        let source = all_chunks[start].source.clone();
        let mut end = start;
        while end < all_chunks.len()
            && all_chunks[end].source == source
            && end - start < config.embedding.batch_size
        {
            end += 1;
        }

        let texts: Vec<String> = all_chunks[start..end].iter().map(|c| c.text.clone()).collect();
        let batch_vectors = cache
            .get_or_compute_batch(provider.as_ref(), &texts, Some(&source))
            .await?;
        vectors.extend(batch_vectors);
        start = end;
    }

    let generation = current_generation(pool).await?.unwrap_or(0) + 1;
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    for (chunk, vec) in all_chunks.iter().zip(vectors.iter()) {
        let blob = embedding::vec_to_blob(vec);
        sqlx::query(
            r#"
            INSERT INTO kb_chunks (id, generation, source, category, chunk_index, text, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                generation = excluded.generation,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(generation)
        .bind(&chunk.source)
        .bind(&chunk.category)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(blob)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO index_meta (id, current_generation, built_at, chunk_count)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            current_generation = excluded.current_generation,
            built_at = excluded.built_at,
            chunk_count = excluded.chunk_count
        "#,
    )
    .bind(generation)
    .bind(now)
    .bind(chunk_count as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    // Old generations are no longer referenced once the pointer flipped.
    sqlx::query("DELETE FROM kb_chunks WHERE generation != ?")
        .bind(generation)
        .execute(pool)
        .await?;

    tracing::info!(generation, chunks = chunk_count, "index rebuilt");

    Ok(IngestReport {
        documents,
        skipped,
        chunk_count,
        generation,
    })
}

async fn current_generation(pool: &SqlitePool) -> Result<Option<i64>, TriageError> {
    let generation: Option<i64> =
        sqlx::query_scalar("SELECT current_generation FROM index_meta WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(generation)
}
