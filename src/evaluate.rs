//! Confidence evaluation: weighted scoring of retrieval quality against
//! the ticket, plus the sentiment override.
//!
//! The score is a weighted sum of clamped factors in [0, 1]:
//! similarity, keyword coverage of the context, and length adequacy
//! (with an optional category-agreement factor, off by default). With
//! weights summing to 1.0 the confidence is itself bounded in [0, 1].
//!
//! The sentiment override runs after a passing score-based decision: an
//! angry ticket escalates even when confidence clears the threshold, and
//! the reported confidence stays at its computed value. Tickets that
//! already escalated (no match, low confidence) keep their own reason.

use crate::config::ConfidenceConfig;
use crate::error::TriageError;
use crate::models::{ConfidenceDecision, Decision, RetrievalResult, TicketAnalysis};
use crate::retrieve::NO_CONTEXT_FOUND;

pub const REASON_NO_MATCH: &str = "no match";
pub const REASON_LOW_CONFIDENCE: &str = "low confidence";
pub const REASON_SUFFICIENT: &str = "sufficient confidence";
pub const REASON_NEGATIVE_SENTIMENT: &str = "negative sentiment detected";

/// Evaluate one ticket's retrieval outcome into a decision.
///
/// `sentiment` is an externally-supplied score in [-1, 1]; callers
/// without a sentiment signal pass 0.0. Total function: malformed
/// inputs (non-finite scores) degrade to an escalation rather than an
/// error.
pub fn evaluate(
    config: &ConfidenceConfig,
    analysis: &TicketAnalysis,
    retrieval: &RetrievalResult,
    ticket_category: Option<&str>,
    sentiment: f64,
) -> ConfidenceDecision {
    if retrieval.context == NO_CONTEXT_FOUND {
        return ConfidenceDecision {
            decision: Decision::Escalate,
            confidence: 0.0,
            reason: REASON_NO_MATCH.to_string(),
        };
    }

    let confidence = match weighted_confidence(config, analysis, retrieval, ticket_category) {
        Ok(c) => c,
        Err(fault) => {
            tracing::warn!(error = %fault, "confidence scoring failed, escalating");
            return ConfidenceDecision {
                decision: Decision::Escalate,
                confidence: 0.0,
                reason: fault.to_string(),
            };
        }
    };

    if confidence < config.threshold {
        return ConfidenceDecision {
            decision: Decision::Escalate,
            confidence,
            reason: REASON_LOW_CONFIDENCE.to_string(),
        };
    }

    // Override applies only to a passing decision; an escalation keeps
    // its own reason.
    if sentiment.is_finite() && sentiment < config.sentiment_floor {
        return ConfidenceDecision {
            decision: Decision::Escalate,
            confidence,
            reason: REASON_NEGATIVE_SENTIMENT.to_string(),
        };
    }

    ConfidenceDecision {
        decision: Decision::Approve,
        confidence,
        reason: REASON_SUFFICIENT.to_string(),
    }
}

/// Weighted sum of clamped factors. A non-finite input similarity is a
/// scoring fault, not a score.
fn weighted_confidence(
    config: &ConfidenceConfig,
    analysis: &TicketAnalysis,
    retrieval: &RetrievalResult,
    ticket_category: Option<&str>,
) -> Result<f64, TriageError> {
    if !retrieval.similarity_score.is_finite() {
        return Err(TriageError::EvaluationFault(
            "non-finite similarity score".to_string(),
        ));
    }

    let similarity = clamp01(retrieval.similarity_score);
    let coverage = keyword_coverage(&analysis.keywords, &retrieval.context);
    let length = length_adequacy(&retrieval.context, config.target_context_chars);
    let category = category_agreement(ticket_category, retrieval);

    let confidence = config.weight_similarity * similarity
        + config.weight_keywords * coverage
        + config.weight_length * length
        + config.weight_category * category;

    if !confidence.is_finite() {
        return Err(TriageError::EvaluationFault(
            "non-finite weighted confidence".to_string(),
        ));
    }

    Ok(clamp01(confidence))
}

/// Fraction of ticket keywords present in the context, case-insensitive
/// substring containment. No keywords means no evidence of coverage.
fn keyword_coverage(keywords: &[String], context: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = context.to_lowercase();
    let found = keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count();
    found as f64 / keywords.len() as f64
}

/// Context length relative to the target, saturating at 1.0.
fn length_adequacy(context: &str, target_chars: usize) -> f64 {
    if target_chars == 0 {
        return 1.0;
    }
    clamp01(context.chars().count() as f64 / target_chars as f64)
}

/// Fraction of kept chunks whose category matches the ticket's. Without
/// a ticket category the factor is neutral at 0.0 (and its weight is
/// 0.0 by default anyway).
fn category_agreement(ticket_category: Option<&str>, retrieval: &RetrievalResult) -> f64 {
    let Some(wanted) = ticket_category else {
        return 0.0;
    };
    if retrieval.hits.is_empty() {
        return 0.0;
    }
    let matching = retrieval
        .hits
        .iter()
        .filter(|h| h.category.eq_ignore_ascii_case(wanted))
        .count();
    matching as f64 / retrieval.hits.len() as f64
}

fn clamp01(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedChunk;

    fn analysis(keywords: &[&str]) -> TicketAnalysis {
        TicketAnalysis {
            summary: "summary".to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn retrieval(context: &str, similarity: f64) -> RetrievalResult {
        RetrievalResult {
            hits: vec![RetrievedChunk {
                text: context.to_string(),
                source: "faq/a.txt".to_string(),
                category: "faq".to_string(),
                score: similarity,
            }],
            context: context.to_string(),
            similarity_score: similarity,
        }
    }

    #[test]
    fn strong_retrieval_approves_at_expected_confidence() {
        let config = ConfidenceConfig::default();
        // Context longer than the 400-char target, covering all keywords.
        let context = format!(
            "password reset instructions {}",
            "detail ".repeat(60)
        );
        let result = evaluate(
            &config,
            &analysis(&["password", "reset"]),
            &retrieval(&context, 0.9),
            None,
            0.0,
        );

        // 0.5 * 0.9 + 0.3 * 1.0 + 0.2 * 1.0 = 0.95
        assert_eq!(result.decision, Decision::Approve);
        assert!((result.confidence - 0.95).abs() < 1e-9);
        assert_eq!(result.reason, REASON_SUFFICIENT);
    }

    #[test]
    fn weak_retrieval_escalates_at_expected_confidence() {
        let config = ConfidenceConfig::default();
        // similarity 0.2, no keyword hits, context at 75% of target.
        let context = "x".repeat(300);
        let result = evaluate(
            &config,
            &analysis(&["unrelated"]),
            &retrieval(&context, 0.2),
            None,
            0.0,
        );

        // 0.5 * 0.2 + 0.3 * 0.0 + 0.2 * 0.75 = 0.25
        assert_eq!(result.decision, Decision::Escalate);
        assert!((result.confidence - 0.25).abs() < 1e-9);
        assert_eq!(result.reason, REASON_LOW_CONFIDENCE);
    }

    #[test]
    fn sentinel_context_escalates_with_zero_confidence() {
        let config = ConfidenceConfig::default();
        let retrieval = RetrievalResult {
            hits: Vec::new(),
            context: NO_CONTEXT_FOUND.to_string(),
            similarity_score: 0.0,
        };
        let result = evaluate(&config, &analysis(&["anything"]), &retrieval, None, 0.0);
        assert_eq!(result.decision, Decision::Escalate);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reason, REASON_NO_MATCH);
    }

    #[test]
    fn negative_sentiment_overrides_an_approval() {
        let config = ConfidenceConfig::default();
        let context = format!("password reset {}", "detail ".repeat(60));
        let result = evaluate(
            &config,
            &analysis(&["password", "reset"]),
            &retrieval(&context, 0.9),
            None,
            -0.9,
        );

        assert_eq!(result.decision, Decision::Escalate);
        assert_eq!(result.reason, REASON_NEGATIVE_SENTIMENT);
        // Confidence keeps its computed value.
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn no_match_keeps_its_reason_under_negative_sentiment() {
        let config = ConfidenceConfig::default();
        let retrieval = RetrievalResult {
            hits: Vec::new(),
            context: NO_CONTEXT_FOUND.to_string(),
            similarity_score: 0.0,
        };
        let result = evaluate(&config, &analysis(&["anything"]), &retrieval, None, -0.9);
        assert_eq!(result.decision, Decision::Escalate);
        assert_eq!(result.reason, REASON_NO_MATCH);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn low_confidence_keeps_its_reason_under_negative_sentiment() {
        let config = ConfidenceConfig::default();
        let context = "x".repeat(300);
        let result = evaluate(
            &config,
            &analysis(&["unrelated"]),
            &retrieval(&context, 0.2),
            None,
            -0.9,
        );
        assert_eq!(result.decision, Decision::Escalate);
        assert_eq!(result.reason, REASON_LOW_CONFIDENCE);
    }

    #[test]
    fn sentiment_at_floor_does_not_override() {
        let config = ConfidenceConfig::default();
        let context = format!("password reset {}", "detail ".repeat(60));
        let result = evaluate(
            &config,
            &analysis(&["password", "reset"]),
            &retrieval(&context, 0.9),
            None,
            config.sentiment_floor,
        );
        assert_eq!(result.decision, Decision::Approve);
    }

    #[test]
    fn out_of_range_similarity_is_clamped() {
        let config = ConfidenceConfig::default();
        let context = format!("password {}", "detail ".repeat(60));
        let result = evaluate(
            &config,
            &analysis(&["password"]),
            &retrieval(&context, 7.5),
            None,
            0.0,
        );
        assert!(result.confidence <= 1.0);
        assert_eq!(result.decision, Decision::Approve);
    }

    #[test]
    fn non_finite_similarity_is_a_scoring_fault() {
        let config = ConfidenceConfig::default();
        let result = evaluate(
            &config,
            &analysis(&["password"]),
            &retrieval("some context", f64::NAN),
            None,
            0.0,
        );
        assert_eq!(result.decision, Decision::Escalate);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reason.contains("evaluation fault"), "{}", result.reason);
    }

    #[test]
    fn empty_keywords_score_zero_coverage() {
        assert_eq!(keyword_coverage(&[], "anything at all"), 0.0);
    }

    #[test]
    fn coverage_is_case_insensitive() {
        let keywords = vec!["Password".to_string(), "REFUND".to_string()];
        assert_eq!(keyword_coverage(&keywords, "password refund policy"), 1.0);
    }

    #[test]
    fn category_agreement_counts_matching_hits() {
        let r = RetrievalResult {
            hits: vec![
                RetrievedChunk {
                    text: String::new(),
                    source: "a".to_string(),
                    category: "faq".to_string(),
                    score: 1.0,
                },
                RetrievedChunk {
                    text: String::new(),
                    source: "b".to_string(),
                    category: "policies".to_string(),
                    score: 0.5,
                },
            ],
            context: "ctx".to_string(),
            similarity_score: 1.0,
        };
        assert_eq!(category_agreement(Some("faq"), &r), 0.5);
        assert_eq!(category_agreement(None, &r), 0.0);
    }
}
