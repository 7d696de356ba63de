//! Core data models used throughout Tutor Harness.
//!
//! These types represent the files, chunks and retrieval results that flow
//! through the ingestion and retrieval pipeline. Learner and log records
//! live next to their logic in [`crate::profile`] and [`crate::evallog`].

use serde::{Deserialize, Serialize};

/// Provenance attached to every chunk cut from the same logical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name the chunk came from.
    pub source: String,
    /// Zero-based page (or other logical unit) index within the file.
    pub page: u32,
    /// Human-readable title derived from the file name.
    pub title: String,
    pub course_id: String,
    pub uploaded_by: String,
    /// Ingestion time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
}

/// A bounded segment of source text plus its provenance.
///
/// Chunks carry no identifier; once handed to a
/// [`VectorIndex`](crate::store::VectorIndex) their identity is positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a nearest-neighbor query, with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

/// Outcome of one retrieval call.
///
/// `is_confident` is true exactly when the best score reaches the
/// similarity threshold. `avg_score` is the mean of all returned scores,
/// rounded to 4 decimal places. `scores_synthetic` marks results whose
/// scores are the 1.0 sentinel from the unscored fallback search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub is_confident: bool,
    pub avg_score: f64,
    #[serde(default)]
    pub scores_synthetic: bool,
}

impl RetrievalResult {
    /// The zero-confidence result returned for an empty index.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scores of the returned chunks, in retrieval order.
    pub fn scores(&self) -> Vec<f64> {
        self.chunks.iter().map(|c| c.score).collect()
    }
}

/// A file handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// File name (the dedup key in the file-hash record).
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Counts reported by one ingestion call.
///
/// `failed` holds files whose text could not be extracted; they are
/// skipped without aborting the batch, so
/// `ingested + skipped + failed` equals the number of input files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_chunks: usize,
}
