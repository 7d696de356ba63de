//! Context blocks and citations derived from a [`RetrievalResult`].

use serde::{Deserialize, Serialize};

use crate::models::{RetrievalResult, ScoredChunk};

/// Placeholder context handed to the generator when nothing was retrieved.
pub const NO_CONTEXT: &str = "(No relevant context found.)";

/// A source a chat answer draws on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: u32,
    pub title: String,
}

/// Render retrieved chunks as numbered, source-annotated blocks:
///
/// ```text
/// --- Chunk 1 (Source: notes.pdf, Page: 3, Relevance: 0.8123) ---
/// <content>
/// ```
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "--- Chunk {} (Source: {}, Page: {}, Relevance: {}) ---\n{}\n",
                i + 1,
                c.metadata.source,
                c.metadata.page,
                c.score,
                c.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Distinct `(source, page, title)` triples in retrieval order.
pub fn citations(result: &RetrievalResult) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for chunk in &result.chunks {
        let citation = Citation {
            source: chunk.metadata.source.clone(),
            page: chunk.metadata.page,
            title: chunk.metadata.title.clone(),
        };
        if !out.contains(&citation) {
            out.push(citation);
        }
    }
    out
}

/// Reference text for answer metrics: chunk contents joined by blank lines.
pub fn reference_text(result: &RetrievalResult) -> String {
    result
        .chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
