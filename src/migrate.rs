//! Schema creation. Every statement is idempotent.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `tutor init`: create the database file and schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Chunks with their embedding vectors (little-endian f32 BLOB).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            title TEXT NOT NULL,
            course_id TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating chunks table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_hashes (
            file_name TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating file_hashes table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interaction_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            query TEXT NOT NULL,
            answer_preview TEXT NOT NULL,
            avg_similarity REAL NOT NULL,
            hit_rate REAL NOT NULL,
            rouge_l_f1 REAL NOT NULL,
            bleu REAL NOT NULL,
            is_confident INTEGER NOT NULL,
            hallucination_risk INTEGER NOT NULL,
            quiz_score REAL,
            quiz_max REAL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating interaction_logs table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_course ON chunks(course_id)")
        .execute(pool)
        .await?;

    Ok(())
}
