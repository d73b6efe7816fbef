//! Reply composition behind the strict two-field contract.
//!
//! A [`ReplyGenerator`] produces raw text that must parse into exactly
//! `{"response": ..., "escalate": ...}`. The default template generator
//! emits that JSON itself, deterministically, in the ticket's language;
//! the Ollama generator asks a local model for it. Either way the output
//! goes through the same strict parse, with code fences stripped first,
//! and anything else is a [`TriageError::MalformedReply`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::analyze::{detect_language, Language};
use crate::config::ComposerConfig;
use crate::error::TriageError;
use crate::models::{ComposedReply, TicketAnalysis};
use crate::retrieve::NO_CONTEXT_FOUND;

/// Fixed reply text used on every escalation, matched to the ticket
/// language. Customers never see internal failure detail.
pub const ESCALATION_REPLY_EN: &str =
    "Thank you for reaching out. Your request needs a closer look, so we have passed it to a support specialist who will get back to you shortly.";
pub const ESCALATION_REPLY_FR: &str =
    "Merci de nous avoir contactés. Votre demande nécessite un examen approfondi ; nous l'avons transmise à un spécialiste du support qui vous répondra sous peu.";

/// Everything a generator needs to draft one reply.
pub struct ReplyRequest<'a> {
    pub ticket: &'a str,
    pub analysis: &'a TicketAnalysis,
    pub context: &'a str,
    pub language: Language,
}

/// Drafts raw reply text for one ticket. Implementations may call out
/// to a model; the template implementation is fully deterministic.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &ReplyRequest<'_>) -> Result<String>;
}

pub fn create_generator(config: &ComposerConfig) -> Result<Box<dyn ReplyGenerator>> {
    match config.provider.as_str() {
        "template" => Ok(Box::new(TemplateGenerator)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => anyhow::bail!("unknown composer provider: {}", other),
    }
}

/// Compose the final customer reply for an approved ticket.
///
/// The generator's raw output is fence-stripped and parsed against the
/// strict contract. A reply that claims grounding it does not have
/// (sentinel context) is flipped to an escalation regardless of what
/// the generator said.
pub async fn compose(
    config: &ComposerConfig,
    ticket: &str,
    analysis: &TicketAnalysis,
    context: &str,
) -> Result<ComposedReply, TriageError> {
    let generator = create_generator(config).map_err(TriageError::Other)?;
    let language = detect_language(ticket);

    let request = ReplyRequest {
        ticket,
        analysis,
        context,
        language,
    };

    let raw = generator
        .generate(&request)
        .await
        .map_err(TriageError::Other)?;

    let cleaned = strip_code_fences(&raw);
    let mut reply: ComposedReply = serde_json::from_str(cleaned).map_err(|e| {
        TriageError::MalformedReply(format!("{} output did not parse: {}", generator.name(), e))
    })?;

    if context == NO_CONTEXT_FOUND && !reply.escalate {
        tracing::warn!(
            generator = generator.name(),
            "reply claims grounding without context, forcing escalation"
        );
        reply = escalation_reply(language);
    }

    Ok(reply)
}

/// The canned escalation reply in the given language.
pub fn escalation_reply(language: Language) -> ComposedReply {
    let response = match language {
        Language::English => ESCALATION_REPLY_EN,
        Language::French => ESCALATION_REPLY_FR,
    };
    ComposedReply {
        response: response.to_string(),
        escalate: true,
    }
}

/// Strip a surrounding markdown code fence (with or without a language
/// tag) from model output. Text without fences passes through.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop a language tag on the opening fence line.
    let body = match body.split_once('\n') {
        Some((first, tail)) if !first.trim().is_empty() && !first.trim().starts_with('{') => tail,
        _ => body,
    };
    body.trim()
}

/// Deterministic template generator: thanks, problem restatement,
/// solution from context, next action. Escalates itself when the
/// context is the sentinel.
pub struct TemplateGenerator;

#[async_trait]
impl ReplyGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &ReplyRequest<'_>) -> Result<String> {
        if request.context == NO_CONTEXT_FOUND {
            return Ok(serde_json::to_string(&escalation_reply(request.language))?);
        }

        let solution = first_sentences(request.context, 2);
        let response = match request.language {
            Language::English => format!(
                "Thank you for contacting us. Regarding your request (\"{}\"): {} If this does not resolve the issue, reply to this message and we will investigate further.",
                request.analysis.summary, solution
            ),
            Language::French => format!(
                "Merci de nous avoir contactés. Concernant votre demande (« {} ») : {} Si cela ne résout pas le problème, répondez à ce message et nous approfondirons.",
                request.analysis.summary, solution
            ),
        };

        Ok(serde_json::to_string(&ComposedReply {
            response,
            escalate: false,
        })?)
    }
}

/// First `n` sentences of the context's top chunk, as the solution body.
fn first_sentences(context: &str, n: usize) -> String {
    let top = context.split("\n---\n").next().unwrap_or(context);
    let mut out = String::new();
    let mut count = 0;
    for piece in top.split_inclusive(['.', '!', '?']) {
        out.push_str(piece);
        count += 1;
        if count >= n {
            break;
        }
    }
    let out = out.trim();
    if out.is_empty() {
        top.trim().to_string()
    } else {
        out.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Asks a local Ollama model to draft the reply JSON.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &ComposerConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("composer.model required for ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, url, model })
    }
}

#[async_trait]
impl ReplyGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &ReplyRequest<'_>) -> Result<String> {
        let language = match request.language {
            Language::English => "English",
            Language::French => "French",
        };
        let prompt = format!(
            "You are a support agent. Using only the knowledge-base context below, draft a reply in {language} to the customer ticket. Answer with a single JSON object with exactly two fields: \"response\" (string) and \"escalate\" (boolean). Set escalate to true if the context does not answer the ticket.\n\nContext:\n{}\n\nTicket:\n{}",
            request.context, request.ticket
        );

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, text);
        }

        let parsed: OllamaGenerateResponse = resp.json().await?;
        Ok(parsed.response)
    }
}
