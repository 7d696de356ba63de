//! Confidence-scored retrieval.
//!
//! Embeds the query, asks the [`VectorIndex`] for the `top_k` nearest
//! chunks and derives the confidence verdict:
//!
//! ```text
//! is_confident = max(scores) >= similarity_threshold   (false when empty)
//! avg_score    = round4(mean(scores))
//! ```
//!
//! When the index cannot produce relevance scores the unscored search is
//! used instead and every result gets the sentinel score `1.0`, which makes
//! the verdict trivially confident. Such results are flagged with
//! [`RetrievalResult::scores_synthetic`].

use anyhow::{Context, Result};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::TutorError;
use crate::ingest::as_provider_error;
use crate::metrics::round4;
use crate::models::{RetrievalResult, ScoredChunk};
use crate::store::VectorIndex;

/// Score assigned to every result of the unscored fallback search.
pub const SENTINEL_SCORE: f64 = 1.0;

/// Retrieval settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub similarity_threshold: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.3,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(TutorError::Validation("top_k must be at least 1".into()).into());
        }
        if !self.similarity_threshold.is_finite() {
            return Err(
                TutorError::Validation("similarity_threshold must be a finite number".into())
                    .into(),
            );
        }
        Ok(())
    }
}

/// Retrieve the chunks most relevant to `query`.
///
/// Never fails on an empty index: the result is empty and not confident.
pub async fn retrieve(
    query: &str,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    params: &RetrievalParams,
) -> Result<RetrievalResult> {
    params.validate()?;

    if index.is_empty().await.context("reading index size")? {
        return Ok(RetrievalResult::empty());
    }

    let vector = embed_query(embedder, query)
        .await
        .map_err(as_provider_error)?;

    match index.query(&vector, params.top_k).await {
        Ok(hits) => {
            let chunks = hits
                .into_iter()
                .map(|c| ScoredChunk {
                    score: round4(c.score),
                    ..c
                })
                .collect();
            Ok(assess(chunks, params.similarity_threshold, false))
        }
        Err(e) if matches!(TutorError::find(&e), Some(TutorError::ScoresUnavailable(_))) => {
            let chunks = index
                .query_unscored(&vector, params.top_k)
                .await
                .context("unscored nearest-neighbor search")?
                .into_iter()
                .map(|c| ScoredChunk {
                    content: c.content,
                    metadata: c.metadata,
                    score: SENTINEL_SCORE,
                })
                .collect();
            Ok(assess(chunks, params.similarity_threshold, true))
        }
        Err(e) => Err(e.context("nearest-neighbor search")),
    }
}

/// Build a [`RetrievalResult`] from scored chunks.
pub fn assess(chunks: Vec<ScoredChunk>, threshold: f64, scores_synthetic: bool) -> RetrievalResult {
    if chunks.is_empty() {
        return RetrievalResult {
            scores_synthetic,
            ..RetrievalResult::empty()
        };
    }

    let max = chunks
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let avg = chunks.iter().map(|c| c.score).sum::<f64>() / chunks.len() as f64;

    RetrievalResult {
        is_confident: max >= threshold,
        avg_score: round4(avg),
        chunks,
        scores_synthetic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TokenEmbedder;
    use crate::models::{Chunk, ChunkMetadata};
    use crate::store::memory::InMemoryIndex;

    fn scored(score: f64) -> ScoredChunk {
        ScoredChunk {
            content: format!("chunk {score}"),
            metadata: meta(),
            score,
        }
    }

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            source: "notes.txt".into(),
            page: 0,
            title: "Notes".into(),
            course_id: "general".into(),
            uploaded_by: "learner".into(),
            timestamp: "2026-01-01 00:00:00".into(),
        }
    }

    async fn populated(index: &InMemoryIndex, embedder: &TokenEmbedder, texts: &[&str]) {
        let items: Vec<(Chunk, Vec<f32>)> = texts
            .iter()
            .map(|t| {
                (
                    Chunk {
                        content: t.to_string(),
                        metadata: meta(),
                    },
                    embedder.embed_one(t),
                )
            })
            .collect();
        index.upsert(&items).await.unwrap();
    }

    #[test]
    fn test_confident_when_max_reaches_threshold() {
        let result = assess(vec![scored(0.9), scored(0.2), scored(0.1)], 0.3, false);
        assert!(result.is_confident);
        assert_eq!(result.avg_score, 0.4);
    }

    #[test]
    fn test_not_confident_below_threshold() {
        let result = assess(vec![scored(0.29), scored(0.1)], 0.3, false);
        assert!(!result.is_confident);
        assert_eq!(result.avg_score, 0.195);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty_result() {
        let embedder = TokenEmbedder::new(32);
        let index = InMemoryIndex::new();
        let result = retrieve("anything", &embedder, &index, &RetrievalParams::default())
            .await
            .unwrap();
        assert!(result.chunks.is_empty());
        assert!(!result.is_confident);
        assert_eq!(result.avg_score, 0.0);
    }

    #[tokio::test]
    async fn test_scores_are_rounded_and_ordered() {
        let embedder = TokenEmbedder::new(512);
        let index = InMemoryIndex::new();
        populated(
            &index,
            &embedder,
            &[
                "the mitochondria is the powerhouse of the cell",
                "rivers flow into the sea",
                "mitochondria make atp",
            ],
        )
        .await;

        let params = RetrievalParams {
            top_k: 2,
            similarity_threshold: 0.3,
        };
        let result = retrieve("what do mitochondria make", &embedder, &index, &params)
            .await
            .unwrap();
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].content, "mitochondria make atp");
        for chunk in &result.chunks {
            assert_eq!(chunk.score, round4(chunk.score));
        }
        assert!(result.chunks[0].score >= result.chunks[1].score);
        assert!(!result.scores_synthetic);
    }

    #[tokio::test]
    async fn test_fallback_assigns_sentinel_scores() {
        let embedder = TokenEmbedder::new(32);
        let index = InMemoryIndex::without_relevance_scores();
        populated(&index, &embedder, &["alpha", "beta", "gamma"]).await;

        let result = retrieve("unrelated", &embedder, &index, &RetrievalParams::default())
            .await
            .unwrap();
        assert_eq!(result.chunks.len(), 3);
        assert!(result.chunks.iter().all(|c| c.score == SENTINEL_SCORE));
        assert!(result.is_confident);
        assert!(result.scores_synthetic);
        assert_eq!(result.avg_score, 1.0);
    }

    #[tokio::test]
    async fn test_zero_top_k_is_rejected() {
        let embedder = TokenEmbedder::new(32);
        let index = InMemoryIndex::new();
        let params = RetrievalParams {
            top_k: 0,
            similarity_threshold: 0.3,
        };
        let err = retrieve("q", &embedder, &index, &params).await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Validation(_))));
    }
}
