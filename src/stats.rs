//! Knowledge-base statistics overview.
//!
//! Summarizes what the index is serving: the current generation, chunk
//! counts per category, embedding-cache health, and database size. Used
//! by `triage stats` to confirm that ingests landed and the cache is
//! warm.

use anyhow::Result;
use sqlx::Row;

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::db;

struct CategoryStats {
    category: String,
    doc_count: i64,
    chunk_count: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;

    let meta = sqlx::query("SELECT current_generation, built_at, chunk_count FROM index_meta WHERE id = 1")
        .fetch_optional(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Ticket Triage — Knowledge Base Stats");
    println!("====================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();

    let Some(meta) = meta else {
        println!("  No index built yet. Run `triage ingest` first.");
        println!();
        pool.close().await;
        return Ok(());
    };

    let generation: i64 = meta.get("current_generation");
    let built_at: i64 = meta.get("built_at");
    let chunk_count: i64 = meta.get("chunk_count");

    println!("  Generation:  {}", generation);
    println!("  Built:       {}", format_ts_relative(built_at));
    println!("  Chunks:      {}", chunk_count);

    let category_rows = sqlx::query(
        r#"
        SELECT category,
               COUNT(DISTINCT source) AS doc_count,
               COUNT(*) AS chunk_count
        FROM kb_chunks
        WHERE generation = ?
        GROUP BY category
        ORDER BY chunk_count DESC
        "#,
    )
    .bind(generation)
    .fetch_all(&pool)
    .await?;

    let category_stats: Vec<CategoryStats> = category_rows
        .iter()
        .map(|row| CategoryStats {
            category: row.get("category"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
        })
        .collect();

    if !category_stats.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<20} {:>6} {:>8}", "CATEGORY", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(36));
        for s in &category_stats {
            println!("  {:<20} {:>6} {:>8}", s.category, s.doc_count, s.chunk_count);
        }
    }

    let cache = EmbeddingCache::new(pool.clone(), config.embedding.clone(), &config.cache);
    let (total, stale) = cache.stats().await?;
    println!();
    println!("  Cache:       {} entries ({} stale)", total, stale);

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
