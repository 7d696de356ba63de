//! Deduplicating ingestion pipeline.
//!
//! Flow per call: hash each file → skip unchanged files → extract pages →
//! clean and chunk → embed every new chunk → one upsert → persist hashes.
//!
//! A file whose content changed replaces the chunks previously stored for
//! its name in the same upsert.
//!
//! File names are the dedup key. A second file in the same call with an
//! already-seen name and different bytes is counted as failed.
//!
//! Per-file extraction failures are counted and skipped. The
//! embed-and-persist step is all or nothing: if embedding or the upsert
//! fails, no chunk and no hash from the call is stored.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use crate::chunk::{chunk_pages, ChunkOrigin, ChunkingParams};
use crate::embedding::EmbeddingProvider;
use crate::error::TutorError;
use crate::models::{Chunk, IngestSummary, SourceFile};
use crate::store::{FileHashStore, VectorIndex};

/// Format of the `timestamp` metadata field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lowercase hex SHA-256 of the raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Turns a file into plain text, one string per logical unit (PDF page,
/// or the whole file for text formats).
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, file: &SourceFile) -> Result<Vec<String>>;
}

/// Treats every file as a single UTF-8 text page.
pub struct PlainTextExtractor;

impl PageExtractor for PlainTextExtractor {
    fn extract_pages(&self, file: &SourceFile) -> Result<Vec<String>> {
        let text = std::str::from_utf8(&file.bytes)
            .with_context(|| format!("{} is not valid UTF-8", file.name))?;
        Ok(vec![text.to_string()])
    }
}

/// Per-call ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub course_id: String,
    pub uploaded_by: String,
    pub chunking: ChunkingParams,
    /// Maximum texts per embedding call.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            course_id: "general".to_string(),
            uploaded_by: "learner".to_string(),
            chunking: ChunkingParams::default(),
            batch_size: 64,
        }
    }
}

/// Progress event emitted during [`ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// Content hash matched the stored value.
    Skipped { file: String },
    /// Text extraction failed; the file is left out of this call.
    Failed { file: String, error: String },
    /// The file was cleaned and chunked.
    Chunked {
        file: String,
        pages: usize,
        chunks: usize,
    },
    /// `done` of `total` chunks embedded so far.
    Embedding { done: usize, total: usize },
    /// Chunks and hashes were committed.
    Committed { chunks: usize },
}

/// Receives [`IngestEvent`]s. Implementations write to stderr, collect
/// events in tests, or do nothing.
pub trait IngestObserver: Send + Sync {
    fn report(&self, event: IngestEvent);
}

pub struct NoopObserver;

impl IngestObserver for NoopObserver {
    fn report(&self, _event: IngestEvent) {}
}

/// Collaborators used by [`ingest`].
pub struct IngestContext<'a> {
    pub extractor: &'a dyn PageExtractor,
    pub embedder: &'a dyn EmbeddingProvider,
    pub index: &'a dyn VectorIndex,
    pub hashes: &'a dyn FileHashStore,
    pub observer: &'a dyn IngestObserver,
}

/// Ingest `files` into the index, skipping files whose content hash is
/// unchanged since the last successful ingestion under the same name.
///
/// Returns [`TutorError::Provider`] (nothing persisted) when the
/// embedding step fails.
pub async fn ingest(
    files: &[SourceFile],
    ctx: &IngestContext<'_>,
    options: &IngestOptions,
) -> Result<IngestSummary> {
    options.chunking.validate()?;

    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut summary = IngestSummary::default();
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut pending_hashes: HashMap<String, String> = HashMap::new();
    let mut new_chunks: Vec<Chunk> = Vec::new();
    let mut stale_sources: Vec<String> = Vec::new();

    for file in files {
        let hash = content_hash(&file.bytes);

        // Two different files under one name would overwrite each other's
        // hash entry and never be skipped again.
        match seen.get(&file.name) {
            Some(previous) if *previous != hash => {
                summary.failed += 1;
                ctx.observer.report(IngestEvent::Failed {
                    file: file.name.clone(),
                    error: TutorError::Validation(format!(
                        "another file named '{}' with different content is already in this batch",
                        file.name
                    ))
                    .to_string(),
                });
                continue;
            }
            Some(_) => {
                summary.skipped += 1;
                ctx.observer.report(IngestEvent::Skipped {
                    file: file.name.clone(),
                });
                continue;
            }
            None => {
                seen.insert(file.name.clone(), hash.clone());
            }
        }

        let known = ctx.hashes.get(&file.name).await?;
        if known.as_deref() == Some(hash.as_str()) {
            summary.skipped += 1;
            ctx.observer.report(IngestEvent::Skipped {
                file: file.name.clone(),
            });
            continue;
        }

        let pages = match ctx.extractor.extract_pages(file) {
            Ok(pages) => pages,
            Err(e) => {
                summary.failed += 1;
                ctx.observer.report(IngestEvent::Failed {
                    file: file.name.clone(),
                    error: format!("{:#}", e),
                });
                continue;
            }
        };

        let origin = ChunkOrigin {
            source: &file.name,
            course_id: &options.course_id,
            uploaded_by: &options.uploaded_by,
            timestamp: &timestamp,
        };
        let chunks = chunk_pages(&pages, &origin, &options.chunking);
        ctx.observer.report(IngestEvent::Chunked {
            file: file.name.clone(),
            pages: pages.len(),
            chunks: chunks.len(),
        });

        if known.is_some() {
            stale_sources.push(file.name.clone());
        }
        summary.ingested += 1;
        summary.total_chunks += chunks.len();
        new_chunks.extend(chunks);
        pending_hashes.insert(file.name.clone(), hash);
    }

    if pending_hashes.is_empty() {
        return Ok(summary);
    }

    let vectors = embed_all(&new_chunks, ctx, options.batch_size.max(1)).await?;
    let items: Vec<(Chunk, Vec<f32>)> = new_chunks.into_iter().zip(vectors).collect();
    if !items.is_empty() || !stale_sources.is_empty() {
        ctx.index
            .replace(&stale_sources, &items)
            .await
            .context("persisting chunks to the vector index")?;
    }

    let entries: Vec<(String, String)> = pending_hashes.into_iter().collect();
    ctx.hashes
        .set_many(&entries)
        .await
        .context("recording file hashes")?;
    ctx.observer.report(IngestEvent::Committed {
        chunks: items.len(),
    });

    Ok(summary)
}

async fn embed_all(
    chunks: &[Chunk],
    ctx: &IngestContext<'_>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let total = chunks.len();
    let mut vectors = Vec::with_capacity(total);

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embedded = ctx
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(as_provider_error)?;
        if embedded.len() != texts.len() {
            bail!(TutorError::Provider(format!(
                "embedding provider '{}' returned {} vectors for {} texts",
                ctx.embedder.model_name(),
                embedded.len(),
                texts.len()
            )));
        }
        vectors.extend(embedded);
        ctx.observer.report(IngestEvent::Embedding {
            done: vectors.len(),
            total,
        });
    }

    Ok(vectors)
}

/// Keep classified errors as they are; anything else from a provider is
/// a [`TutorError::Provider`].
pub fn as_provider_error(err: anyhow::Error) -> anyhow::Error {
    if TutorError::find(&err).is_some() {
        err
    } else {
        TutorError::Provider(format!("{:#}", err)).into()
    }
}

/// Delete every stored chunk and forget every file hash.
pub async fn clear_store(index: &dyn VectorIndex, hashes: &dyn FileHashStore) -> Result<()> {
    index.clear().await.context("clearing the vector index")?;
    hashes.clear().await.context("clearing file hashes")?;
    Ok(())
}
