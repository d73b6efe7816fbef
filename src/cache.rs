//! Durable embedding cache.
//!
//! Memoizes embedding computations by content hash with a TTL, so
//! re-ingesting an unchanged corpus and repeated queries do not recompute
//! vectors. Entries live in SQLite and survive process restarts.
//!
//! The key is `sha256(model ‖ "\n" ‖ text)`, so switching embedding models
//! never serves vectors from the wrong model. Concurrent writers to the
//! same key upsert; last writer wins, which is safe because embeddings
//! for identical text are deterministic.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::{CacheConfig, EmbeddingConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::TriageError;

pub struct EmbeddingCache {
    pool: SqlitePool,
    embedding: EmbeddingConfig,
    ttl_secs: i64,
}

impl EmbeddingCache {
    pub fn new(pool: SqlitePool, embedding: EmbeddingConfig, cache: &CacheConfig) -> Self {
        Self {
            pool,
            embedding,
            ttl_secs: cache.ttl_secs,
        }
    }

    /// Cache key for a text under a given model.
    pub fn cache_key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Return the cached embedding for `text`, or compute, store, and
    /// return a fresh one. Entries older than the TTL are recomputed and
    /// replaced in place.
    ///
    /// `source` tags the entry with the corpus file it came from, so a
    /// targeted re-ingest can invalidate everything derived from one file.
    /// Query embeddings pass `None`.
    pub async fn get_or_compute(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
        source: Option<&str>,
    ) -> Result<Vec<f32>, TriageError> {
        let mut vectors = self
            .get_or_compute_batch(provider, &[text.to_string()], source)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| TriageError::Other(anyhow::anyhow!("empty embedding batch result")))
    }

    /// Batch variant of [`get_or_compute`]: looks every text up in the
    /// cache, embeds only the misses in one provider call, and returns
    /// vectors in input order.
    pub async fn get_or_compute_batch(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
        source: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, TriageError> {
        let now = chrono::Utc::now().timestamp();
        let model = provider.model_name().to_string();

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = Self::cache_key(&model, text);
            let row = sqlx::query("SELECT embedding, created_at FROM embedding_cache WHERE key = ?")
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => {
                    let created_at: i64 = row.get("created_at");
                    if now - created_at < self.ttl_secs {
                        let blob: Vec<u8> = row.get("embedding");
                        results[i] = Some(embedding::blob_to_vec(&blob));
                    } else {
                        misses.push(i);
                    }
                }
                None => misses.push(i),
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh =
                embedding::embed_texts_with_deadline(provider, &self.embedding, &miss_texts)
                    .await?;

            for (&i, vec) in misses.iter().zip(fresh.iter()) {
                let key = Self::cache_key(&model, &texts[i]);
                self.upsert(&key, &model, provider.dims(), vec, source, now)
                    .await?;
                results[i] = Some(vec.clone());
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn upsert(
        &self,
        key: &str,
        model: &str,
        dims: usize,
        vec: &[f32],
        source: Option<&str>,
        now: i64,
    ) -> Result<(), TriageError> {
        let blob = embedding::vec_to_blob(vec);
        sqlx::query(
            r#"
            INSERT INTO embedding_cache (key, model, dims, embedding, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                source = excluded.source,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(model)
        .bind(dims as i64)
        .bind(blob)
        .bind(source)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a single cache entry. Returns the number of rows removed.
    pub async fn invalidate_key(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embedding_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove every entry derived from one corpus file. Used after a
    /// targeted re-ingest of that file.
    pub async fn invalidate_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embedding_cache WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// (total entries, entries past the TTL).
    pub async fn stats(&self) -> Result<(i64, i64)> {
        let now = chrono::Utc::now().timestamp();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache")
            .fetch_one(&self.pool)
            .await?;
        let stale: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache WHERE created_at <= ?")
                .bind(now - self.ttl_secs)
                .fetch_one(&self.pool)
                .await?;
        Ok((total, stale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::migrate;

    async fn test_cache(ttl_secs: i64) -> (EmbeddingCache, Box<dyn EmbeddingProvider>) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        let embedding = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(32),
            ..Default::default()
        };
        let provider = embedding::create_provider(&embedding).unwrap();
        let cache = EmbeddingCache::new(pool, embedding, &CacheConfig { ttl_secs });
        (cache, provider)
    }

    #[tokio::test]
    async fn cold_then_warm_returns_identical_vectors() {
        let (cache, provider) = test_cache(3600).await;

        let cold = cache
            .get_or_compute(provider.as_ref(), "I forgot my password", None)
            .await
            .unwrap();
        let warm = cache
            .get_or_compute(provider.as_ref(), "I forgot my password", None)
            .await
            .unwrap();

        assert_eq!(cold, warm);
        let (total, stale) = cache.stats().await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(stale, 0);
    }

    #[tokio::test]
    async fn invalidate_key_removes_entry() {
        let (cache, provider) = test_cache(3600).await;

        cache
            .get_or_compute(provider.as_ref(), "refund policy", None)
            .await
            .unwrap();

        let key = EmbeddingCache::cache_key(provider.model_name(), "refund policy");
        assert_eq!(cache.invalidate_key(&key).await.unwrap(), 1);
        let (total, _) = cache.stats().await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn invalidate_source_removes_all_derived_entries() {
        let (cache, provider) = test_cache(3600).await;

        let texts = vec!["chunk one".to_string(), "chunk two".to_string()];
        cache
            .get_or_compute_batch(provider.as_ref(), &texts, Some("faq/returns.txt"))
            .await
            .unwrap();
        cache
            .get_or_compute(provider.as_ref(), "a query", None)
            .await
            .unwrap();

        assert_eq!(cache.invalidate_source("faq/returns.txt").await.unwrap(), 2);
        let (total, _) = cache.stats().await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn stale_entry_is_recomputed_and_replaced() {
        // TTL of 1 second with a backdated entry.
        let (cache, provider) = test_cache(1).await;

        cache
            .get_or_compute(provider.as_ref(), "stale me", None)
            .await
            .unwrap();

        // Backdate the row past the TTL.
        sqlx::query("UPDATE embedding_cache SET created_at = created_at - 10")
            .execute(&cache.pool)
            .await
            .unwrap();

        let (_, stale) = cache.stats().await.unwrap();
        assert_eq!(stale, 1);

        let refreshed = cache
            .get_or_compute(provider.as_ref(), "stale me", None)
            .await
            .unwrap();
        assert!(!refreshed.is_empty());

        // Still one entry for the key, now fresh.
        let (total, stale) = cache.stats().await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(stale, 0);
    }
}
