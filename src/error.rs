//! Error taxonomy for the triage core.
//!
//! Only ingestion-time failures (`EmptyCorpus`, a completely unavailable
//! embedding provider) surface to the operator as hard errors. Everything
//! on the answer path is converted by the pipeline into an escalation
//! response, so `triage answer` always terminates with a well-formed result.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    /// The corpus scan produced zero chunks. The previous index, if any,
    /// is left untouched.
    #[error("corpus at {path} produced no chunks; index not rebuilt")]
    EmptyCorpus { path: PathBuf },

    /// A document format the extractor cannot handle. Skippable per file.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// An external embedding call exceeded its configured deadline.
    #[error("embedding call timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    /// No vector index has ever been built for this database.
    #[error("no vector index has been built yet; run `triage ingest` first")]
    IndexUnavailable,

    /// A confidence sub-signal could not be computed. Caught by the
    /// evaluator and downgraded to an escalation.
    #[error("evaluation fault: {0}")]
    EvaluationFault(String),

    /// The reply generator returned output that does not parse into the
    /// two-field reply contract.
    #[error("composer returned malformed output: {0}")]
    MalformedReply(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
