use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
        "**/*.png".to_string(),
        "**/*.jpg".to_string(),
        "**/*.jpeg".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_chunk_words() -> usize {
    200
}
fn default_overlap_words() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,
    /// Normalized-score cutoff applied by the pipeline's filter stage.
    /// 0.0 keeps everything.
    #[serde(default)]
    pub similarity_cutoff: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rerank_top_n: default_rerank_top_n(),
            similarity_cutoff: 0.0,
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_rerank_top_n() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_weight_similarity")]
    pub weight_similarity: f64,
    #[serde(default = "default_weight_keywords")]
    pub weight_keywords: f64,
    #[serde(default = "default_weight_length")]
    pub weight_length: f64,
    /// Extension point: weight for ticket/chunk category agreement.
    /// Disabled by default; when raised, the other weights must be
    /// lowered so the four still sum to 1.0.
    #[serde(default)]
    pub weight_category: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Context length (chars) at which the length-adequacy factor saturates.
    #[serde(default = "default_target_context_chars")]
    pub target_context_chars: usize,
    /// Sentiment scores below this floor force an escalation.
    #[serde(default = "default_sentiment_floor")]
    pub sentiment_floor: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            weight_similarity: default_weight_similarity(),
            weight_keywords: default_weight_keywords(),
            weight_length: default_weight_length(),
            weight_category: 0.0,
            threshold: default_threshold(),
            target_context_chars: default_target_context_chars(),
            sentiment_floor: default_sentiment_floor(),
        }
    }
}

fn default_weight_similarity() -> f64 {
    0.5
}
fn default_weight_keywords() -> f64 {
    0.3
}
fn default_weight_length() -> f64 {
    0.2
}
fn default_threshold() -> f64 {
    0.6
}
fn default_target_context_chars() -> usize {
    400
}
fn default_sentiment_floor() -> f64 {
    -0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> i64 {
    86_400 // 24h
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            url: None,
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    60
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ComposerConfig {
    #[serde(default = "default_composer_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            provider: default_composer_provider(),
            model: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_composer_provider() -> String {
    "template".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoriesConfig {
    #[serde(default = "default_allowed_categories")]
    pub allowed: Vec<String>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_categories(),
        }
    }
}

fn default_allowed_categories() -> Vec<String> {
    vec![
        "policies".to_string(),
        "faq".to_string(),
        "guide".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    if c.chunk_words == 0 {
        anyhow::bail!("chunking.chunk_words must be > 0");
    }
    if c.overlap_words >= c.chunk_words {
        anyhow::bail!("chunking.overlap_words must be < chunking.chunk_words");
    }

    let r = &config.retrieval;
    if r.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if r.rerank_top_n < 1 || r.rerank_top_n > r.top_k {
        anyhow::bail!("retrieval.rerank_top_n must be in [1, retrieval.top_k]");
    }
    if !(0.0..=1.0).contains(&r.similarity_cutoff) {
        anyhow::bail!("retrieval.similarity_cutoff must be in [0.0, 1.0]");
    }

    let w = &config.confidence;
    for (name, value) in [
        ("weight_similarity", w.weight_similarity),
        ("weight_keywords", w.weight_keywords),
        ("weight_length", w.weight_length),
        ("weight_category", w.weight_category),
        ("threshold", w.threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("confidence.{} must be in [0.0, 1.0]", name);
        }
    }
    let sum = w.weight_similarity + w.weight_keywords + w.weight_length + w.weight_category;
    if (sum - 1.0).abs() > 1e-6 {
        anyhow::bail!("confidence weights must sum to 1.0 (got {})", sum);
    }
    if w.target_context_chars == 0 {
        anyhow::bail!("confidence.target_context_chars must be > 0");
    }

    if config.cache.ttl_secs <= 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or disabled.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.ocr.provider.as_str() {
        "disabled" => {}
        "remote" => {
            if config.ocr.url.is_none() {
                anyhow::bail!("ocr.url must be specified when provider is 'remote'");
            }
        }
        other => anyhow::bail!("Unknown OCR provider: '{}'. Must be disabled or remote.", other),
    }

    match config.composer.provider.as_str() {
        "template" => {}
        "ollama" => {
            if config.composer.model.is_none() {
                anyhow::bail!("composer.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown composer provider: '{}'. Must be template or ollama.",
            other
        ),
    }

    if config.categories.allowed.is_empty() {
        anyhow::bail!("categories.allowed must not be empty");
    }

    Ok(())
}
