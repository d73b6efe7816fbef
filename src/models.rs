//! Core data models for the triage pipeline.
//!
//! These types represent the knowledge-base documents, chunks, retrieval
//! results, and decisions that flow through ingestion and ticket answering.

use serde::{Deserialize, Serialize};

/// File format of a knowledge-base document, detected from its extension.
///
/// Extraction dispatches over this closed set; anything else is skipped
/// at scan time (logged, non-fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Image,
}

impl DocumentFormat {
    /// Detect a format from a file extension (lowercased, no dot).
    /// Returns `None` for unsupported extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "pdf" => Some(DocumentFormat::Pdf),
            "png" | "jpg" | "jpeg" => Some(DocumentFormat::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Image => "image",
        }
    }
}

/// A bounded slice of a document's text — the unit of retrieval.
///
/// Carries a back-reference to its source document's metadata (file name
/// and normalized category) but not the document body itself.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub category: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// One retrieved chunk with its normalized rank score in [0, 1].
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub category: String,
    pub score: f64,
}

/// Ordered retrieval output for one query. Ephemeral, never persisted.
///
/// `context` is the concatenation of the kept chunk texts in rank order,
/// or the sentinel marker when nothing was retrieved. `similarity_score`
/// is the best normalized score of the kept set (0.0 for the sentinel).
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
    pub context: String,
    pub similarity_score: f64,
}

/// Approve/escalate verdict for one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Escalate => "ESCALATE",
        }
    }
}

/// Output of the confidence evaluator: the decision, a confidence in
/// [0, 1], and a short human-readable reason.
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceDecision {
    pub decision: Decision,
    pub confidence: f64,
    pub reason: String,
}

/// Summary and keywords extracted from the raw ticket text.
#[derive(Debug, Clone)]
pub struct TicketAnalysis {
    pub summary: String,
    pub keywords: Vec<String>,
}

/// The strict two-field reply contract produced by a reply generator.
///
/// Anything that does not parse into exactly this shape is a composer
/// failure, not something to pass through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposedReply {
    pub response: String,
    pub escalate: bool,
}

/// Final, always-well-formed outcome of processing one ticket.
#[derive(Debug, Clone, Serialize)]
pub struct FinalResponse {
    pub decision: Decision,
    pub confidence: f64,
    pub reason: String,
    pub response: String,
    pub sources: Vec<String>,
}
