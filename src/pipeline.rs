//! End-to-end ticket processing: analyze, retrieve, filter, evaluate,
//! then compose or escalate.
//!
//! [`Pipeline::process`] is total. Every stage fault — unavailable
//! index, embedding timeout, malformed generator output — degrades to a
//! well-formed escalation response; callers never see an error from it.

use sqlx::SqlitePool;

use crate::analyze::{self, detect_language};
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::TriageError;
use crate::evaluate;
use crate::index::{self, IndexHandle};
use crate::models::{Decision, FinalResponse, RetrievalResult, RetrievedChunk};
use crate::respond;
use crate::retrieve::{self, CONTEXT_SEPARATOR, NO_CONTEXT_FOUND};

pub struct Pipeline {
    config: Config,
    pool: SqlitePool,
    cache: EmbeddingCache,
    provider: Box<dyn EmbeddingProvider>,
    index: IndexHandle,
}

impl Pipeline {
    /// Build a pipeline over an open database. The index is loaded if a
    /// generation exists; otherwise the pipeline starts without one and
    /// every ticket escalates until [`reload_index`](Self::reload_index)
    /// succeeds.
    pub async fn new(config: Config, pool: SqlitePool) -> Result<Self, TriageError> {
        let provider = embedding::create_provider(&config.embedding).map_err(TriageError::Other)?;
        let cache = EmbeddingCache::new(pool.clone(), config.embedding.clone(), &config.cache);

        let index = match index::load_current(&pool).await {
            Ok(loaded) => IndexHandle::with_index(loaded),
            Err(TriageError::IndexUnavailable) => IndexHandle::empty(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            config,
            pool,
            cache,
            provider,
            index,
        })
    }

    /// Swap in the latest built generation. In-flight readers keep the
    /// generation they started with.
    pub async fn reload_index(&self) -> Result<(), TriageError> {
        let loaded = index::load_current(&self.pool).await?;
        self.index.swap(loaded)
    }

    /// Process one ticket into a final response. Never fails: stage
    /// errors become escalations carrying the failure as the reason.
    pub async fn process(&self, ticket: &str, sentiment: f64) -> FinalResponse {
        match self.run_stages(ticket, sentiment).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "pipeline stage failed, escalating");
                escalation_response(ticket, 0.0, &format!("processing error: {}", e), Vec::new())
            }
        }
    }

    async fn run_stages(&self, ticket: &str, sentiment: f64) -> Result<FinalResponse, TriageError> {
        let analysis = analyze::analyze_ticket(ticket);

        // The retrieval query is the normalized summary, not the raw
        // ticket: long tickets are bounded and whitespace-cleaned before
        // they reach the embedder.
        let retrieval = match self.index.current() {
            Ok(index) => {
                retrieve::retrieve(
                    &self.config.retrieval,
                    &self.cache,
                    self.provider.as_ref(),
                    &index,
                    &analysis.summary,
                )
                .await?
            }
            // No index yet is an expected state, not a fault: treat it
            // as retrieval finding nothing.
            Err(TriageError::IndexUnavailable) => RetrievalResult {
                hits: Vec::new(),
                context: NO_CONTEXT_FOUND.to_string(),
                similarity_score: 0.0,
            },
            Err(e) => return Err(e),
        };

        let retrieval = filter_hits(&retrieval, self.config.retrieval.similarity_cutoff);

        let verdict = evaluate::evaluate(&self.config.confidence, &analysis, &retrieval, None, sentiment);

        let sources = unique_sources(&retrieval.hits);

        if verdict.decision == Decision::Escalate {
            return Ok(escalation_response(
                ticket,
                verdict.confidence,
                &verdict.reason,
                sources,
            ));
        }

        match respond::compose(&self.config.composer, ticket, &analysis, &retrieval.context).await {
            // Customers never see unvetted generator text on escalation;
            // the canned language-matched reply goes out instead.
            Ok(reply) if reply.escalate => Ok(escalation_response(
                ticket,
                verdict.confidence,
                "reply generator requested escalation",
                sources,
            )),
            Ok(reply) => Ok(FinalResponse {
                decision: Decision::Approve,
                confidence: verdict.confidence,
                reason: verdict.reason,
                response: reply.response,
                sources,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "reply composition failed, escalating");
                Ok(escalation_response(
                    ticket,
                    verdict.confidence,
                    &format!("composition error: {}", e),
                    sources,
                ))
            }
        }
    }
}

/// Drop hits below the cutoff and rebuild the joined context so it stays
/// aligned with the kept set. Filtering everything out yields the
/// sentinel, same as retrieving nothing.
fn filter_hits(retrieval: &RetrievalResult, cutoff: f64) -> RetrievalResult {
    if cutoff <= 0.0 || retrieval.context == NO_CONTEXT_FOUND {
        return retrieval.clone();
    }

    let hits: Vec<RetrievedChunk> = retrieval
        .hits
        .iter()
        .filter(|h| h.score >= cutoff)
        .cloned()
        .collect();

    if hits.is_empty() {
        return RetrievalResult {
            hits,
            context: NO_CONTEXT_FOUND.to_string(),
            similarity_score: 0.0,
        };
    }

    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let similarity_score = hits.iter().map(|h| h.score).fold(0.0, f64::max);

    RetrievalResult {
        hits,
        context,
        similarity_score,
    }
}

fn unique_sources(hits: &[RetrievedChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in hits {
        if !sources.contains(&hit.source) {
            sources.push(hit.source.clone());
        }
    }
    sources
}

fn escalation_response(
    ticket: &str,
    confidence: f64,
    reason: &str,
    sources: Vec<String>,
) -> FinalResponse {
    let reply = respond::escalation_reply(detect_language(ticket));
    FinalResponse {
        decision: Decision::Escalate,
        confidence,
        reason: reason.to_string(),
        response: reply.response,
        sources,
    }
}
