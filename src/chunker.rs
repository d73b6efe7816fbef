//! Word-window text chunker with overlap carry.
//!
//! Splits document body text into [`Chunk`]s of at most `chunk_words`
//! words. Text is first cut into logical blocks at markdown-heading
//! boundaries when headings are present; otherwise the whole body is one
//! block and plain word-window chunking applies. When a chunk fills up,
//! the next one starts with the trailing `overlap_words` of the previous
//! chunk so context is not lost at the seam.
//!
//! Each chunk receives a deterministic id and a SHA-256 hash of its text,
//! so re-ingesting an unchanged corpus produces identical chunks.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split a document body into chunks. Returns an empty vec for
/// whitespace-only input (the document then contributes nothing to the
/// index).
pub fn chunk_document(
    source: &str,
    category: &str,
    text: &str,
    chunk_words: usize,
    overlap_words: usize,
) -> Vec<Chunk> {
    assert!(chunk_words > overlap_words, "validated at config load");

    if text.trim().is_empty() {
        return Vec::new();
    }

    let blocks = split_blocks(text);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let flush = |current: &mut Vec<&str>, chunks: &mut Vec<Chunk>| {
        if !current.is_empty() {
            let index = chunks.len() as i64;
            chunks.push(make_chunk(source, category, index, &current.join(" ")));
        }
        let tail_start = current.len().saturating_sub(overlap_words);
        let tail: Vec<&str> = current[tail_start..].to_vec();
        *current = tail;
    };

    for block in &blocks {
        let words: Vec<&str> = block.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        // Prefer a clean break at the block boundary when the whole block
        // would not fit into the current chunk.
        if !current.is_empty() && current.len() + words.len() > chunk_words {
            flush(&mut current, &mut chunks);
        }

        for word in words {
            if current.len() >= chunk_words {
                flush(&mut current, &mut chunks);
            }
            current.push(word);
        }
    }

    if !current.is_empty() {
        let index = chunks.len() as i64;
        chunks.push(make_chunk(source, category, index, &current.join(" ")));
    }

    chunks
}

/// Cut text into logical blocks. A line starting with `#` begins a new
/// block; if no heading exists, the whole text is a single block.
fn split_blocks(text: &str) -> Vec<String> {
    let has_headings = text.lines().any(|l| l.trim_start().starts_with('#'));
    if !has_headings {
        return vec![text.to_string()];
    }

    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim_start().starts_with('#') && !current.trim().is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

fn make_chunk(source: &str, category: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    // Id derived from source + index + content hash, stable across rebuilds.
    let mut id_hasher = Sha256::new();
    id_hasher.update(source.as_bytes());
    id_hasher.update(index.to_le_bytes());
    id_hasher.update(hash.as_bytes());
    let id = format!("{:x}", id_hasher.finalize());

    Chunk {
        id,
        source: source.to_string(),
        category: category.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
