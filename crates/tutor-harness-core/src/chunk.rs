//! Text cleaning and recursive-separator chunking.
//!
//! Extracted document text is first passed through [`clean_text`], which
//! strips page-number-only lines and collapses runs of blank lines and
//! spaces. The cleaned text is then cut by [`split_text`] into overlapping
//! pieces of at most `chunk_size` characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", ". ", " ", ""]` that
//!    occurs in the text (the empty separator always matches and splits
//!    into single characters).
//! 2. Split on it, keeping the separator at the end of each piece.
//! 3. Pieces shorter than `chunk_size` are merged greedily into chunks; a
//!    new chunk starts with the tail of the previous one, dropping pieces
//!    from the front until at most `chunk_overlap` characters remain.
//! 4. Pieces that are still too long are split recursively with the
//!    remaining, finer separators.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text is
//! never cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use tutor_harness_core::chunk::{split_text, ChunkingParams};
//!
//! let params = ChunkingParams { chunk_size: 40, chunk_overlap: 10 };
//! let chunks = split_text("First paragraph.\n\nSecond paragraph is here.", &params);
//! assert_eq!(chunks, vec!["First paragraph.", "Second paragraph is here."]);
//! ```

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::TutorError;
use crate::models::{Chunk, ChunkMetadata};

/// Separators in priority order: paragraph, line, sentence, word, character.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingParams {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TutorError::Validation("chunk_size must be > 0".into()).into());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(TutorError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Per-file provenance shared by every chunk of an ingestion call.
#[derive(Debug, Clone)]
pub struct ChunkOrigin<'a> {
    pub source: &'a str,
    pub course_id: &'a str,
    pub uploaded_by: &'a str,
    pub timestamp: &'a str,
}

struct CleanPatterns {
    page_number: Regex,
    blank_lines: Regex,
    spaces: Regex,
}

fn clean_patterns() -> &'static CleanPatterns {
    static PATTERNS: OnceLock<CleanPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CleanPatterns {
        page_number: Regex::new(r"(?m)^\s*(Page\s*)?\d{1,4}\s*$").expect("static pattern compiles"),
        blank_lines: Regex::new(r"\n{3,}").expect("static pattern compiles"),
        spaces: Regex::new(r" {2,}").expect("static pattern compiles"),
    })
}

/// Remove page-number-only lines and collapse blank lines and spaces.
pub fn clean_text(text: &str) -> String {
    let p = clean_patterns();
    let text = p.page_number.replace_all(text, "");
    let text = p.blank_lines.replace_all(&text, "\n\n");
    let text = p.spaces.replace_all(&text, " ");
    text.trim().to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` on `separator`, keeping the separator at the end of each piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    text.split_inclusive(separator)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Greedily merge small pieces into chunks of at most `chunk_size` characters.
fn merge_pieces(pieces: &[&str], params: &ChunkingParams, out: &mut Vec<String>) {
    let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        if total + len > params.chunk_size && !window.is_empty() {
            push_trimmed(&window, out);
            while total > params.chunk_overlap
                || (total + len > params.chunk_size && total > 0)
            {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }
        window.push_back(piece);
        total += len;
    }

    if !window.is_empty() {
        push_trimmed(&window, out);
    }
}

fn push_trimmed(window: &std::collections::VecDeque<&str>, out: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn split_recursive(text: &str, separators: &[&str], params: &ChunkingParams, out: &mut Vec<String>) {
    let (index, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(i, sep)| (i, *sep))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let finer = separators.get(index + 1..).unwrap_or(&[]);

    let mut small: Vec<&str> = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < params.chunk_size {
            small.push(piece);
            continue;
        }
        if !small.is_empty() {
            merge_pieces(&small, params, out);
            small.clear();
        }
        if finer.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            split_recursive(piece, finer, params, out);
        }
    }
    if !small.is_empty() {
        merge_pieces(&small, params, out);
    }
}

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Returns an empty vector for blank input. Chunks are trimmed.
pub fn split_text(text: &str, params: &ChunkingParams) -> Vec<String> {
    let mut out = Vec::new();
    if text.trim().is_empty() {
        return out;
    }
    split_recursive(text, &SEPARATORS, params, &mut out);
    out
}

/// Derive a display title from a file name.
///
/// Uses the last path component, drops the extension, turns underscores
/// into spaces and title-cases each word: `week1/intro_to_ml.pdf` becomes
/// `Intro To Ml`.
pub fn derive_title(file_name: &str) -> String {
    let file_name = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    let stem = match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    };
    let mut title = String::with_capacity(stem.len());
    let mut at_word_start = true;
    for c in stem.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if at_word_start {
                title.extend(c.to_uppercase());
            } else {
                title.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            title.push(c);
            at_word_start = true;
        }
    }
    title
}

/// Clean and chunk every page of a file, attaching provenance metadata.
pub fn chunk_pages(pages: &[String], origin: &ChunkOrigin<'_>, params: &ChunkingParams) -> Vec<Chunk> {
    let title = derive_title(origin.source);
    let mut chunks = Vec::new();
    for (page, text) in pages.iter().enumerate() {
        let cleaned = clean_text(text);
        for content in split_text(&cleaned, params) {
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata {
                    source: origin.source.to_string(),
                    page: page as u32,
                    title: title.clone(),
                    course_id: origin.course_id.to_string(),
                    uploaded_by: origin.uploaded_by.to_string(),
                    timestamp: origin.timestamp.to_string(),
                },
            });
        }
    }
    chunks
}
