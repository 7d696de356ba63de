//! Persisted evaluation log and its export.
//!
//! `tutor ask` appends each turn's [`LogEntry`] to the `interaction_logs`
//! table so the log survives across invocations. `tutor logs export`
//! reads it back and writes CSV or JSON to a file, or to stdout for
//! piping.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use tutor_harness_core::evallog::{export_csv, export_json, LogEntry};

use crate::config::Config;
use crate::db;

/// Export format for `tutor logs export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Csv,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "csv" => Ok(LogFormat::Csv),
            "json" => Ok(LogFormat::Json),
            other => bail!("Unknown log format '{}'. Use csv or json.", other),
        }
    }

    pub fn render(&self, entries: &[LogEntry]) -> Result<String> {
        match self {
            LogFormat::Csv => export_csv(entries),
            LogFormat::Json => export_json(entries),
        }
    }
}

/// Append one entry to `interaction_logs`.
pub async fn save_entry(pool: &SqlitePool, entry: &LogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO interaction_logs (timestamp, query, answer_preview, avg_similarity,
                                      hit_rate, rouge_l_f1, bleu, is_confident,
                                      hallucination_risk, quiz_score, quiz_max)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.timestamp)
    .bind(&entry.query)
    .bind(&entry.answer_preview)
    .bind(entry.avg_similarity)
    .bind(entry.hit_rate)
    .bind(entry.rouge_l_f1)
    .bind(entry.bleu)
    .bind(entry.is_confident)
    .bind(entry.hallucination_risk)
    .bind(entry.quiz_score)
    .bind(entry.quiz_max)
    .execute(pool)
    .await
    .context("saving interaction log entry")?;
    Ok(())
}

/// Attach a quiz score to the most recent persisted entry. Returns false
/// when no entry exists.
pub async fn attach_quiz_score(pool: &SqlitePool, score: f64, max: f64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE interaction_logs SET quiz_score = ?, quiz_max = ? \
         WHERE id = (SELECT MAX(id) FROM interaction_logs)",
    )
    .bind(score)
    .bind(max)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// All persisted entries, oldest first.
pub async fn load_entries(pool: &SqlitePool) -> Result<Vec<LogEntry>> {
    let rows = sqlx::query(
        "SELECT timestamp, query, answer_preview, avg_similarity, hit_rate, rouge_l_f1, bleu, \
         is_confident, hallucination_risk, quiz_score, quiz_max \
         FROM interaction_logs ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("loading interaction logs")?;

    Ok(rows
        .iter()
        .map(|row| LogEntry {
            timestamp: row.get("timestamp"),
            query: row.get("query"),
            answer_preview: row.get("answer_preview"),
            avg_similarity: row.get("avg_similarity"),
            hit_rate: row.get("hit_rate"),
            rouge_l_f1: row.get("rouge_l_f1"),
            bleu: row.get("bleu"),
            is_confident: row.get("is_confident"),
            hallucination_risk: row.get("hallucination_risk"),
            quiz_score: row.get("quiz_score"),
            quiz_max: row.get("quiz_max"),
        })
        .collect())
}

/// Export the persisted log.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout.
pub async fn run_export(config: &Config, format: LogFormat, output: Option<&Path>) -> Result<()> {
    let pool = db::open(config).await?;
    let entries = load_entries(&pool).await?;
    let rendered = format.render(&entries)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Exported {} log entries to {}", entries.len(), path.display());
        }
        None => {
            print!("{}", rendered);
            if !rendered.ends_with('\n') {
                println!();
            }
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;
    use tutor_harness_core::evallog::create_log_entry;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_load_and_attach() {
        let pool = memory_pool().await;
        assert!(!attach_quiz_score(&pool, 1.0, 2.0).await.unwrap());

        let first = create_log_entry("q1", "a1", &[0.5, 0.1], 0.25, 0.1, true);
        let second = create_log_entry("q2", "a2", &[], 0.0, 0.0, false);
        save_entry(&pool, &first).await.unwrap();
        save_entry(&pool, &second).await.unwrap();
        assert!(attach_quiz_score(&pool, 3.0, 4.0).await.unwrap());

        let loaded = load_entries(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], first);
        assert_eq!(loaded[1].quiz_score, Some(3.0));
        assert_eq!(loaded[1].quiz_max, Some(4.0));
        assert!(loaded[1].hallucination_risk);
    }

    #[test]
    fn test_format_parse_and_render_empty() {
        assert_eq!(LogFormat::parse("CSV").unwrap(), LogFormat::Csv);
        assert!(LogFormat::parse("xml").is_err());
        assert_eq!(LogFormat::Csv.render(&[]).unwrap(), "");
        assert_eq!(LogFormat::Json.render(&[]).unwrap(), "[]");
    }
}
