//! Storage abstractions for Tutor Harness.
//!
//! Two collaborators back the pipeline:
//!
//! - [`VectorIndex`]: an opaque nearest-neighbor store of chunks and
//!   their embedding vectors.
//! - [`FileHashStore`]: the file name → content hash record used to skip
//!   re-ingestion of unchanged files.
//!
//! Both are `Send + Sync` and async (via `async-trait`) so they can be
//! backed by SQLite in the application and by [`memory`] in tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

/// Abstract nearest-neighbor index over embedded chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Store a batch of chunks with their vectors, all or nothing |
/// | [`replace`](VectorIndex::replace) | Drop chunks of re-ingested sources, then upsert |
/// | [`query`](VectorIndex::query) | Top-k chunks with relevance scores, best first |
/// | [`query_unscored`](VectorIndex::query_unscored) | Top-k chunks without scores |
/// | [`clear`](VectorIndex::clear) | Delete every stored chunk |
/// | [`len`](VectorIndex::len) | Number of stored chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store chunks with their vectors. Either the whole batch is stored or none of it.
    async fn upsert(&self, items: &[(Chunk, Vec<f32>)]) -> Result<()>;

    /// Delete every chunk whose `metadata.source` is in `sources`.
    async fn remove_sources(&self, sources: &[String]) -> Result<()>;

    /// Delete the chunks of `stale_sources`, then store `items`.
    ///
    /// Backends with transactions should override this so both steps
    /// commit together.
    async fn replace(&self, stale_sources: &[String], items: &[(Chunk, Vec<f32>)]) -> Result<()> {
        if !stale_sources.is_empty() {
            self.remove_sources(stale_sources).await?;
        }
        self.upsert(items).await
    }

    /// Return up to `k` chunks ordered by descending relevance.
    ///
    /// Backends that cannot produce calibrated scores fail with
    /// [`TutorError::ScoresUnavailable`](crate::TutorError::ScoresUnavailable).
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Return up to `k` nearest chunks, best first, without scores.
    async fn query_unscored(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>>;

    /// Delete every stored chunk.
    async fn clear(&self) -> Result<()>;

    /// Number of stored chunks.
    async fn len(&self) -> Result<usize>;

    /// True when the index has never been populated (or was cleared).
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Key-value record of file name → content hash.
#[async_trait]
pub trait FileHashStore: Send + Sync {
    async fn get(&self, file_name: &str) -> Result<Option<String>>;

    async fn set(&self, file_name: &str, hash: &str) -> Result<()>;

    /// Record several hashes at once.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        for (name, hash) in entries {
            self.set(name, hash).await?;
        }
        Ok(())
    }

    /// Forget every recorded hash.
    async fn clear(&self) -> Result<()>;
}
