//! Token-budgeted note chunking.
//!
//! Notes are split into overlapping segments sized by an approximate token
//! count (`chars / 3.5`, a language-agnostic heuristic, not a real
//! tokenizer). Splitting is paragraph-first, falling back to sentence
//! boundaries for oversized paragraphs and to a hard character split for
//! oversized sentences. Every chunk's content is an exact slice of the
//! composite text, so offsets are verifiable against the source.

use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;
use crate::types::Note;

/// Characters per estimated token.
const CHARS_PER_TOKEN: f64 = 3.5;

/// A bounded slice of a note's text, the unit of embedding and retrieval.
///
/// Indices are 0-based, sequential and gap-free in emission order. Offsets
/// are byte offsets into the composite text handed to the chunker; the
/// content is always exactly `text[start_offset..end_offset]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub index: usize,
    pub token_count: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Configuration alias re-exported for callers constructing a [`Chunker`]
/// without a full `RagConfig`.
pub type ChunkerConfig = ChunkingConfig;

/// Estimate the token count of a text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil() as usize
}

/// Note chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkingConfig::default())
    }

    /// Chunk a note. The note's metadata is rendered into a header block so
    /// titles, tags and dates are searchable alongside the body. Never
    /// returns zero chunks.
    pub fn chunk_note(&self, note: &Note) -> Vec<Chunk> {
        let mut composite = format!("Title: {}\n", note.title);
        if !note.tags.is_empty() {
            composite.push_str(&format!("Tags: {}\n", note.tags.join(", ")));
        }
        composite.push_str(&format!("Created: {}\n", note.created_at.format("%Y-%m-%d")));
        composite.push_str(&format!(
            "Last Updated: {}\n",
            note.updated_at.format("%Y-%m-%d")
        ));
        composite.push_str(&format!("Content:\n{}", note.content));

        let chunks = self.chunk_text(&composite);
        if chunks.is_empty() {
            // Unreachable with a non-empty header, kept as a hard guarantee.
            return vec![Chunk {
                content: String::new(),
                index: 0,
                token_count: 0,
                start_offset: 0,
                end_offset: 0,
            }];
        }
        chunks
    }

    /// Chunk free text using the configured budget. When chunking is
    /// disabled, the whole text is returned as a single chunk regardless of
    /// length.
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        if !self.config.enabled {
            if text.trim().is_empty() {
                return Vec::new();
            }
            return vec![Chunk {
                content: text.to_string(),
                index: 0,
                token_count: estimate_tokens(text),
                start_offset: 0,
                end_offset: text.len(),
            }];
        }

        chunk_text(text, self.config.max_tokens, self.config.overlap_tokens)
    }
}

/// Split text into token-bounded, overlapping chunks.
///
/// Returns an empty list for empty or whitespace-only input.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_tokens = max_tokens.max(1);

    // Units tile the text exactly: paragraphs, split down to sentences and
    // hard character splits until each unit fits the budget.
    let mut units: Vec<(usize, usize)> = Vec::new();
    for (start, end) in paragraph_ranges(text) {
        if estimate_tokens(&text[start..end]) <= max_tokens {
            units.push((start, end));
            continue;
        }
        for (s, e) in sentence_ranges(text, start, end) {
            if estimate_tokens(&text[s..e]) <= max_tokens {
                units.push((s, e));
            } else {
                hard_split(text, s, e, max_tokens, &mut units);
            }
        }
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut chunk_start = units.first().map(|(s, _)| *s).unwrap_or(0);
    let mut chunk_end = chunk_start;

    for &(_, unit_end) in &units {
        let candidate_tokens = estimate_tokens(&text[chunk_start..unit_end]);
        let have_content = chunk_end > chunk_start;

        if have_content && candidate_tokens > max_tokens {
            chunks.push(make_chunk(text, chunks.len(), chunk_start, chunk_end));
            chunk_start = overlap_start(text, chunk_start, chunk_end, overlap_tokens);
        }

        chunk_end = unit_end;
    }

    if chunk_end > chunk_start {
        chunks.push(make_chunk(text, chunks.len(), chunk_start, chunk_end));
    }

    chunks
}

fn make_chunk(text: &str, index: usize, start: usize, end: usize) -> Chunk {
    let content = &text[start..end];
    Chunk {
        content: content.to_string(),
        index,
        token_count: estimate_tokens(content),
        start_offset: start,
        end_offset: end,
    }
}

/// Byte ranges of paragraphs, each extended through its trailing blank-line
/// separator so the ranges tile the text exactly.
fn paragraph_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            // A blank line (possibly with intervening whitespace) ends the
            // paragraph; the separator belongs to the preceding range.
            let mut j = i + 1;
            let mut saw_second_newline = false;
            while j < bytes.len() && (bytes[j] == b'\n' || bytes[j] == b'\r' || bytes[j] == b' ') {
                if bytes[j] == b'\n' {
                    saw_second_newline = true;
                }
                j += 1;
            }
            if saw_second_newline {
                ranges.push((start, j));
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if start < bytes.len() {
        ranges.push((start, bytes.len()));
    }
    ranges
}

/// Byte ranges of sentences within `[start, end)`, tiling the range exactly.
/// A boundary sits after `.`, `!` or `?` followed by whitespace.
fn sentence_ranges(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let bytes = text.as_bytes();
    let mut sent_start = start;
    let mut i = start;

    while i + 1 < end {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1].is_ascii_whitespace() {
            let mut j = i + 1;
            while j < end && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            ranges.push((sent_start, j));
            sent_start = j;
            i = j;
            continue;
        }
        i += 1;
    }

    if sent_start < end {
        ranges.push((sent_start, end));
    }
    ranges
}

/// Hard-split an oversized range at the character boundary nearest the token
/// budget, repeatedly.
fn hard_split(
    text: &str,
    start: usize,
    end: usize,
    max_tokens: usize,
    units: &mut Vec<(usize, usize)>,
) {
    let budget_chars = ((max_tokens as f64) * CHARS_PER_TOKEN) as usize;
    let mut piece_start = start;

    while piece_start < end {
        let remaining = &text[piece_start..end];
        if remaining.chars().count() <= budget_chars {
            units.push((piece_start, end));
            return;
        }

        let split_at = remaining
            .char_indices()
            .nth(budget_chars)
            .map(|(idx, _)| piece_start + idx)
            .unwrap_or(end);

        units.push((piece_start, split_at));
        piece_start = split_at;
    }
}

/// Pick the start offset of the next chunk so it re-includes roughly
/// `overlap_tokens` of trailing context from the previous chunk, preferring
/// a sentence boundary over a mid-sentence cut.
fn overlap_start(text: &str, prev_start: usize, prev_end: usize, overlap_tokens: usize) -> usize {
    if overlap_tokens == 0 {
        return prev_end;
    }

    let overlap_chars = ((overlap_tokens as f64) * CHARS_PER_TOKEN) as usize;
    let window_start = text[prev_start..prev_end]
        .char_indices()
        .rev()
        .nth(overlap_chars.saturating_sub(1))
        .map(|(idx, _)| prev_start + idx)
        .unwrap_or(prev_start);

    // Prefer the first sentence start inside the overlap window.
    for (_, sent_end) in sentence_ranges(text, window_start, prev_end) {
        if sent_end < prev_end {
            return sent_end;
        }
    }

    window_start
}
