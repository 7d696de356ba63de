//! Ingestion command orchestration.
//!
//! Wires the SQLite index, the file-hash record, the configured embedding
//! provider and the document extractor into the core ingestion algorithm:
//! scan → hash check → extract → chunk → embed → commit.

use anyhow::{Context, Result};
use std::path::PathBuf;

use tutor_harness_core::ingest::{self, IngestContext, IngestObserver};
use tutor_harness_core::models::IngestSummary;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::extract::DocumentExtractor;
use crate::progress::ProgressMode;
use crate::scan;
use crate::sqlite_store::{SqliteHashStore, SqliteIndex};

/// Ingest files or directories from the command line and print a summary.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    course_id: Option<&str>,
    uploaded_by: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    let files = scan::collect_files(paths, &config.ingest)?;
    let observer = progress.observer();
    let summary = ingest_sources(config, &files, course_id, uploaded_by, observer.as_ref()).await?;

    println!("ingest");
    println!("  files found: {}", files.len());
    println!("  ingested: {}", summary.ingested);
    println!("  skipped (unchanged): {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("  chunks written: {}", summary.total_chunks);
    println!("ok");
    Ok(())
}

/// Ingest already-loaded files into the configured store.
pub async fn ingest_sources(
    config: &Config,
    files: &[tutor_harness_core::models::SourceFile],
    course_id: Option<&str>,
    uploaded_by: Option<&str>,
    observer: &dyn IngestObserver,
) -> Result<IngestSummary> {
    let pool = db::open(config).await?;
    let embedder = embedding::create_provider(&config.embedding)?;
    let index = SqliteIndex::new(pool.clone());
    let hashes = SqliteHashStore::new(pool.clone());

    let ctx = IngestContext {
        extractor: &DocumentExtractor,
        embedder: embedder.as_ref(),
        index: &index,
        hashes: &hashes,
        observer,
    };
    let options = config.ingest_options(course_id, uploaded_by);
    let summary = ingest::ingest(files, &ctx, &options)
        .await
        .context("ingestion failed")?;

    pool.close().await;
    Ok(summary)
}

/// Delete every chunk and reset the file-hash record.
pub async fn run_clear(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let index = SqliteIndex::new(pool.clone());
    let hashes = SqliteHashStore::new(pool.clone());
    ingest::clear_store(&index, &hashes).await?;
    pool.close().await;

    println!("cleared index and file hashes");
    Ok(())
}
