//! Schema migrations. Idempotent; run by `triage init` and by tests.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Index metadata: a single row naming the generation currently served.
    // Rebuilds write a new generation and flip this pointer atomically.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            current_generation INTEGER NOT NULL,
            built_at INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexed chunks with their embedding vectors, keyed by generation.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kb_chunks (
            id TEXT PRIMARY KEY,
            generation INTEGER NOT NULL,
            source TEXT NOT NULL,
            category TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Durable embedding cache keyed by content hash.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_cache (
            key TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            source TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kb_chunks_generation ON kb_chunks(generation)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embedding_cache_source ON embedding_cache(source)")
        .execute(pool)
        .await?;

    Ok(())
}
