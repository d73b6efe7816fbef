//! # Ticket Triage CLI (`triage`)
//!
//! The `triage` binary is the primary interface for Ticket Triage. It
//! provides commands for database initialization, knowledge-base
//! ingestion, ticket answering, ad-hoc retrieval, embedding-cache
//! maintenance, and index statistics.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite database and run schema migrations |
//! | `triage ingest` | Scan the corpus and rebuild the vector index |
//! | `triage answer "<ticket>"` | Process one ticket into an approve/escalate response |
//! | `triage retrieve "<query>"` | Show ranked context for a query |
//! | `triage cache stats` | Inspect the embedding cache |
//! | `triage cache invalidate` | Drop cache entries by key or source file |
//! | `triage stats` | Show index generation and per-category counts |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ticket_triage::cache::EmbeddingCache;
use ticket_triage::config;
use ticket_triage::db;
use ticket_triage::ingest;
use ticket_triage::migrate;
use ticket_triage::pipeline::Pipeline;
use ticket_triage::retrieve;
use ticket_triage::stats;

/// Ticket Triage CLI — a retrieval-and-decision core for customer-support
/// ticket pipelines.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Ticket Triage — answer support tickets from a local knowledge base, or escalate",
    version,
    long_about = "Ticket Triage ingests a knowledge base of support documents into a local \
    SQLite-backed vector index and processes incoming tickets: it retrieves grounding context, \
    scores confidence in that context, and either composes a customer-ready reply or escalates \
    the ticket to a human agent."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/triage.toml`. Corpus, database, embedding,
    /// and decision-policy settings are read from this file.
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (index_meta, kb_chunks, embedding_cache). Idempotent — running it
    /// multiple times is safe.
    Init,

    /// Scan the corpus and rebuild the vector index.
    ///
    /// Extracts text from every supported document, chunks and embeds it,
    /// and atomically swaps in the new index generation. The previous
    /// generation keeps serving until the swap commits.
    Ingest {
        /// Show document and chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Process one ticket into an approve/escalate response.
    ///
    /// Runs the full pipeline: analyze, retrieve, evaluate, then compose
    /// a reply or escalate. Always succeeds; faults surface as
    /// escalations, not errors.
    Answer {
        /// The raw ticket text.
        ticket: String,

        /// Sentiment score for the ticket in [-1, 1], from an upstream
        /// analyzer. Defaults to neutral.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        sentiment: f64,

        /// Print the full response as JSON instead of a human summary.
        #[arg(long)]
        json: bool,
    },

    /// Show ranked context for a query without making a decision.
    ///
    /// Useful for debugging retrieval quality: prints each kept chunk
    /// with its source, category, and normalized score.
    Retrieve {
        /// The query string.
        query: String,

        /// Maximum number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Manage the embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show index generation, chunk counts, and cache health.
    Stats,
}

/// Embedding-cache subcommands.
#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts and staleness.
    Stats,

    /// Drop cache entries by key or by source file.
    Invalidate {
        /// Exact cache key (sha256 hex) to drop.
        #[arg(long)]
        key: Option<String>,

        /// Drop every entry derived from this corpus file (relative path).
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dry_run } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let report = ingest::run_ingest(&cfg, &pool, dry_run).await?;
            pool.close().await;

            if dry_run {
                println!(
                    "Dry run: {} documents, {} chunks ({} skipped). Nothing written.",
                    report.documents, report.chunk_count, report.skipped
                );
            } else {
                println!(
                    "Ingested {} documents into {} chunks ({} skipped). Index generation {}.",
                    report.documents, report.chunk_count, report.skipped, report.generation
                );
            }
        }
        Commands::Answer {
            ticket,
            sentiment,
            json,
        } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let pipeline = Pipeline::new(cfg, pool.clone()).await?;
            let response = pipeline.process(&ticket, sentiment).await;
            pool.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("Decision:   {}", response.decision.as_str());
                println!("Confidence: {:.2}", response.confidence);
                println!("Reason:     {}", response.reason);
                if !response.sources.is_empty() {
                    println!("Sources:    {}", response.sources.join(", "));
                }
                println!();
                println!("{}", response.response);
            }
        }
        Commands::Retrieve { query, k } => {
            let mut cfg = cfg;
            if let Some(k) = k {
                cfg.retrieval.top_k = k;
                cfg.retrieval.rerank_top_n = k;
            }

            let pool = db::connect(&cfg.db.path).await?;
            let index = ticket_triage::index::load_current(&pool).await?;
            let provider = ticket_triage::embedding::create_provider(&cfg.embedding)?;
            let cache = EmbeddingCache::new(pool.clone(), cfg.embedding.clone(), &cfg.cache);

            let result =
                retrieve::retrieve(&cfg.retrieval, &cache, provider.as_ref(), &index, &query)
                    .await?;
            pool.close().await;

            if result.hits.is_empty() {
                println!("No context found.");
            } else {
                for (i, hit) in result.hits.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} ({})",
                        i + 1,
                        hit.score,
                        hit.source,
                        hit.category
                    );
                    println!("   {}", snippet(&hit.text, 160));
                }
            }
        }
        Commands::Cache { action } => {
            let pool = db::connect(&cfg.db.path).await?;
            let cache = EmbeddingCache::new(pool.clone(), cfg.embedding.clone(), &cfg.cache);

            match action {
                CacheAction::Stats => {
                    let (total, stale) = cache.stats().await?;
                    println!("Cache entries: {} ({} stale)", total, stale);
                }
                CacheAction::Invalidate { key, source } => match (key, source) {
                    (Some(key), None) => {
                        let removed = cache.invalidate_key(&key).await?;
                        println!("Removed {} entr{}.", removed, plural_y(removed));
                    }
                    (None, Some(source)) => {
                        let removed = cache.invalidate_source(&source).await?;
                        println!("Removed {} entr{}.", removed, plural_y(removed));
                    }
                    _ => {
                        anyhow::bail!("pass exactly one of --key or --source");
                    }
                },
            }
            pool.close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

fn plural_y(n: u64) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}
