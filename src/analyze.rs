//! Ticket analysis: summary, keywords, and language detection.
//!
//! Pure text processing, no external calls. The summary is the
//! whitespace-normalized head of the ticket; keywords are the first
//! distinct non-stopword tokens. The stopword list covers English and
//! French, the two languages the composer can reply in.

use crate::models::TicketAnalysis;

const SUMMARY_MAX_CHARS: usize = 200;
const MAX_KEYWORDS: usize = 8;
const MIN_KEYWORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    // English
    "the", "a", "an", "and", "or", "for", "to", "of", "in", "on", "with", "without", "my", "your",
    "i", "you", "he", "she", "we", "they", "is", "are", "be", "been", "was", "were", "it", "this",
    "that", "have", "has", "had", "not", "but", "can", "will", "would",
    // French
    "le", "la", "les", "un", "une", "des", "de", "du", "dans", "et", "ou", "pour", "sur", "avec",
    "sans", "mon", "ma", "mes", "votre", "vos", "je", "tu", "il", "elle", "nous", "vous", "ils",
    "elles", "ne", "pas", "au", "aux", "ce", "cet", "cette", "ces", "est", "été", "être", "que",
    "qui", "plus",
];

/// Reply language detected from ticket text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    French,
}

/// Extract a summary and keywords from raw ticket text.
pub fn analyze_ticket(text: &str) -> TicketAnalysis {
    let clean = normalize_whitespace(text);

    let summary: String = clean.chars().take(SUMMARY_MAX_CHARS).collect();

    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(&clean) {
        if token.chars().count() < MIN_KEYWORD_LEN || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !keywords.contains(&token) {
            keywords.push(token);
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }

    // Never return an empty keyword list for a non-empty ticket; the
    // first token is better than nothing for coverage scoring.
    if keywords.is_empty() {
        if let Some(first) = clean.split_whitespace().next() {
            keywords.push(first.to_lowercase());
        }
    }

    TicketAnalysis { summary, keywords }
}

/// Detect the reply language by counting stopword hits per language.
/// Defaults to English on a tie or when nothing matches.
pub fn detect_language(text: &str) -> Language {
    const FRENCH_MARKERS: &[&str] = &[
        "le", "la", "les", "une", "des", "je", "vous", "est", "pas", "mon", "votre", "merci",
        "bonjour", "mot", "passe", "ne", "du", "au", "être", "été",
    ];
    const ENGLISH_MARKERS: &[&str] = &[
        "the", "a", "is", "my", "your", "i", "not", "have", "can", "please", "hello", "thanks",
        "password", "and", "to",
    ];

    let mut fr = 0usize;
    let mut en = 0usize;
    for token in tokenize(text) {
        if FRENCH_MARKERS.contains(&token.as_str()) {
            fr += 1;
        }
        if ENGLISH_MARKERS.contains(&token.as_str()) {
            en += 1;
        }
    }

    if fr > en {
        Language::French
    } else {
        Language::English
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
