//! One-shot `tutor ask` and `tutor retrieve` commands.
//!
//! `ask` runs a single chat turn with a fresh profile from `[learner]`
//! and appends the resulting log entry to `interaction_logs`.

use anyhow::Result;
use std::sync::Arc;

use tutor_harness_core::models::{RetrievalResult, ScoredChunk};
use tutor_harness_core::retrieve::retrieve;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::export;
use crate::generation;
use crate::session::{Collaborators, TutorSession};
use crate::sqlite_store::SqliteIndex;

/// Characters of chunk text shown per retrieval hit.
const EXCERPT_CHARS: usize = 160;

pub(crate) async fn open_session(config: &Config, top_k: Option<usize>) -> Result<(TutorSession, sqlx::SqlitePool)> {
    let pool = db::open(config).await?;
    let mut params = config.retrieval_params();
    if let Some(k) = top_k {
        params.top_k = k;
    }
    let deps = Collaborators {
        embedder: embedding::create_provider(&config.embedding)?,
        generator: generation::create_generator(&config.generation)?,
        index: Arc::new(SqliteIndex::new(pool.clone())),
        params,
    };
    Ok((TutorSession::new(config.learner_profile()?, deps), pool))
}

/// Run one chat turn and print the answer, citations and metrics.
pub async fn run_ask(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let (mut session, pool) = open_session(config, top_k).await?;
    let turn = session.ask(query).await?;
    export::save_entry(&pool, &turn.log_entry).await?;

    println!("{}", turn.answer.trim());
    println!();
    if !turn.citations.is_empty() {
        println!("Sources:");
        for c in &turn.citations {
            println!("  - {} ({}, page {})", c.title, c.source, c.page);
        }
        println!();
    }
    println!(
        "confidence: {}  avg relevance: {:.4}  rouge-l: {:.4}  bleu: {:.4}",
        confidence_label(&turn.retrieval),
        turn.retrieval.avg_score,
        turn.log_entry.rouge_l_f1,
        turn.log_entry.bleu
    );

    pool.close().await;
    Ok(())
}

/// Print the chunks most relevant to `query` with the confidence verdict.
pub async fn run_retrieve(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let pool = db::open(config).await?;
    let embedder = embedding::create_provider(&config.embedding)?;
    let index = SqliteIndex::new(pool.clone());
    let mut params = config.retrieval_params();
    if let Some(k) = top_k {
        params.top_k = k;
    }
    let result = retrieve(query, embedder.as_ref(), &index, &params).await?;

    if result.chunks.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, chunk) in result.chunks.iter().enumerate() {
        print_hit(i + 1, chunk);
    }
    println!(
        "confidence: {}  avg relevance: {:.4}",
        confidence_label(&result),
        result.avg_score
    );

    pool.close().await;
    Ok(())
}

fn print_hit(rank: usize, chunk: &ScoredChunk) {
    let meta = &chunk.metadata;
    println!(
        "{}. [{:.4}] {} / {}",
        rank, chunk.score, meta.source, meta.title
    );
    println!("    page: {}", meta.page);
    println!("    course: {}", meta.course_id);
    println!("    excerpt: \"{}\"", excerpt(&chunk.content));
    println!();
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat.to_string(),
    }
}

fn confidence_label(result: &RetrievalResult) -> &'static str {
    match (result.is_confident, result.scores_synthetic) {
        (true, true) => "confident (unscored)",
        (true, false) => "confident",
        (false, _) => "low",
    }
}
