//! In-memory [`VectorIndex`] and [`FileHashStore`] implementations.
//!
//! Backed by `Vec`/`HashMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::TutorError;
use crate::models::{Chunk, ScoredChunk};

use super::{FileHashStore, VectorIndex};

/// In-memory vector index for tests and embedding in other programs.
pub struct InMemoryIndex {
    items: RwLock<Vec<(Chunk, Vec<f32>)>>,
    relevance_scores: bool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            relevance_scores: true,
        }
    }

    /// An index whose scored query always fails with
    /// [`TutorError::ScoresUnavailable`], like a backend without
    /// relevance-score support.
    pub fn without_relevance_scores() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            relevance_scores: false,
        }
    }

    fn ranked(&self, vector: &[f32], k: usize) -> Result<Vec<(Chunk, f64)>> {
        let items = self
            .items
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let mut scored: Vec<(Chunk, f64)> = items
            .iter()
            .map(|(chunk, v)| (chunk.clone(), cosine_similarity(vector, v) as f64))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, items: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let mut stored = self
            .items
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        stored.extend(items.iter().cloned());
        Ok(())
    }

    async fn remove_sources(&self, sources: &[String]) -> Result<()> {
        self.items
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?
            .retain(|(chunk, _)| !sources.contains(&chunk.metadata.source));
        Ok(())
    }

    async fn replace(&self, stale_sources: &[String], items: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let mut stored = self
            .items
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        stored.retain(|(chunk, _)| !stale_sources.contains(&chunk.metadata.source));
        stored.extend(items.iter().cloned());
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if !self.relevance_scores {
            return Err(TutorError::ScoresUnavailable(
                "index was created without relevance scores".into(),
            )
            .into());
        }
        Ok(self
            .ranked(vector, k)?
            .into_iter()
            .map(|(chunk, score)| ScoredChunk {
                content: chunk.content,
                metadata: chunk.metadata,
                score,
            })
            .collect())
    }

    async fn query_unscored(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .ranked(vector, k)?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.items
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?
            .clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .items
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?
            .len())
    }
}

/// In-memory file-hash record.
#[derive(Default)]
pub struct InMemoryHashStore {
    hashes: RwLock<HashMap<String, String>>,
}

impl InMemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileHashStore for InMemoryHashStore {
    async fn get(&self, file_name: &str) -> Result<Option<String>> {
        Ok(self
            .hashes
            .read()
            .map_err(|_| anyhow!("hash store lock poisoned"))?
            .get(file_name)
            .cloned())
    }

    async fn set(&self, file_name: &str, hash: &str) -> Result<()> {
        self.hashes
            .write()
            .map_err(|_| anyhow!("hash store lock poisoned"))?
            .insert(file_name.to_string(), hash.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.hashes
            .write()
            .map_err(|_| anyhow!("hash store lock poisoned"))?
            .clear();
        Ok(())
    }
}
