//! Database statistics.
//!
//! A quick summary of what's indexed: chunk and file counts, recorded
//! hashes, logged interactions and a per-source breakdown. Used by
//! `tutor stats` to confirm that ingestion did what was expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-source breakdown of chunk counts.
struct SourceStats {
    source: String,
    course_id: String,
    chunk_count: i64,
    pages: i64,
    last_ingest: String,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let total_sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let total_hashes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_hashes")
        .fetch_one(&pool)
        .await?;
    let total_logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interaction_logs")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Tutor Harness: Database Stats");
    println!("=============================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Sources:       {}", total_sources);
    println!("  Chunks:        {}", total_chunks);
    println!("  File hashes:   {}", total_hashes);
    println!("  Interactions:  {}", total_logs);

    let source_rows = sqlx::query(
        r#"
        SELECT source, course_id,
               COUNT(*) AS chunk_count,
               COUNT(DISTINCT page) AS pages,
               MAX(timestamp) AS last_ingest
        FROM chunks
        GROUP BY source, course_id
        ORDER BY chunk_count DESC, source
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            course_id: row.get("course_id"),
            chunk_count: row.get("chunk_count"),
            pages: row.get("pages"),
            last_ingest: row.get("last_ingest"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:<12} {:>6} {:>8}   {}",
            "SOURCE", "COURSE", "PAGES", "CHUNKS", "INGESTED"
        );
        println!("  {}", "-".repeat(80));

        for s in &source_stats {
            println!(
                "  {:<28} {:<12} {:>6} {:>8}   {}",
                s.source, s.course_id, s.pages, s.chunk_count, s.last_ingest
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
