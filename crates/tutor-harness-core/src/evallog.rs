//! Per-interaction evaluation records and their CSV/JSON export.
//!
//! One [`LogEntry`] is created per chat turn. Entries are append-only; the
//! only later change is attaching a quiz score to the most recent one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::metrics::round4;

/// Fixed relevance bar for `hit_rate`, independent of the confidence threshold.
pub const HIT_THRESHOLD: f64 = 0.3;
/// Characters of the answer kept in `answer_preview`.
pub const PREVIEW_CHARS: usize = 200;

/// CSV column order.
pub const CSV_FIELDS: [&str; 11] = [
    "timestamp",
    "query",
    "answer_preview",
    "avg_similarity",
    "hit_rate",
    "rouge_l_f1",
    "bleu",
    "is_confident",
    "hallucination_risk",
    "quiz_score",
    "quiz_max",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `%Y-%m-%d %H:%M:%S`, local time.
    pub timestamp: String,
    pub query: String,
    pub answer_preview: String,
    pub avg_similarity: f64,
    pub hit_rate: f64,
    pub rouge_l_f1: f64,
    pub bleu: f64,
    pub is_confident: bool,
    pub hallucination_risk: bool,
    pub quiz_score: Option<f64>,
    pub quiz_max: Option<f64>,
}

impl LogEntry {
    /// Attach a quiz result.
    pub fn with_quiz(mut self, score: f64, max: f64) -> Self {
        self.quiz_score = Some(score);
        self.quiz_max = Some(max);
        self
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "timestamp" => Some(self.timestamp.clone()),
            "query" => Some(self.query.clone()),
            "answer_preview" => Some(self.answer_preview.clone()),
            "avg_similarity" => Some(self.avg_similarity.to_string()),
            "hit_rate" => Some(self.hit_rate.to_string()),
            "rouge_l_f1" => Some(self.rouge_l_f1.to_string()),
            "bleu" => Some(self.bleu.to_string()),
            "is_confident" => Some(self.is_confident.to_string()),
            "hallucination_risk" => Some(self.hallucination_risk.to_string()),
            "quiz_score" => self.quiz_score.map(|v| v.to_string()),
            "quiz_max" => self.quiz_max.map(|v| v.to_string()),
            _ => None,
        }
    }
}

/// The answer cut to [`PREVIEW_CHARS`] characters, with `...` appended
/// when something was cut.
pub fn answer_preview(answer: &str) -> String {
    match answer.char_indices().nth(PREVIEW_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &answer[..byte_idx]),
        None => answer.to_string(),
    }
}

/// Fraction of `scores` at or above [`HIT_THRESHOLD`]; 0 when empty.
pub fn hit_rate(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let hits = scores.iter().filter(|s| **s >= HIT_THRESHOLD).count();
    hits as f64 / scores.len() as f64
}

/// Build the log record for one chat turn.
pub fn create_log_entry(
    query: &str,
    answer: &str,
    retrieval_scores: &[f64],
    rouge_l: f64,
    bleu: f64,
    is_confident: bool,
) -> LogEntry {
    let avg = if retrieval_scores.is_empty() {
        0.0
    } else {
        retrieval_scores.iter().sum::<f64>() / retrieval_scores.len() as f64
    };

    LogEntry {
        timestamp: chrono::Local::now()
            .format(crate::ingest::TIMESTAMP_FORMAT)
            .to_string(),
        query: query.to_string(),
        answer_preview: answer_preview(answer),
        avg_similarity: round4(avg),
        hit_rate: round4(hit_rate(retrieval_scores)),
        rouge_l_f1: round4(rouge_l),
        bleu: round4(bleu),
        is_confident,
        hallucination_risk: !is_confident,
        quiz_score: None,
        quiz_max: None,
    }
}

/// Append-only log of one session's interactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalLog {
    entries: Vec<LogEntry>,
}

impl EvalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Attach a quiz score to the most recent entry. Returns false when
    /// the log is empty.
    pub fn attach_quiz_score(&mut self, score: f64, max: f64) -> bool {
        match self.entries.last_mut() {
            Some(last) => {
                last.quiz_score = Some(score);
                last.quiz_max = Some(max);
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialize entries as CSV.
///
/// The header is always the full [`CSV_FIELDS`] list, so the schema does
/// not depend on which entries carry a quiz score; absent quiz fields
/// become empty cells. An empty slice yields an empty string.
pub fn export_csv(entries: &[LogEntry]) -> Result<String> {
    if entries.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_FIELDS).context("writing CSV header")?;
    for entry in entries {
        let row: Vec<String> = CSV_FIELDS
            .iter()
            .map(|f| entry.field(f).unwrap_or_default())
            .collect();
        writer.write_record(&row).context("writing CSV row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV output: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Serialize entries as a pretty-printed JSON array. Absent quiz fields
/// are written as `null`.
pub fn export_json(entries: &[LogEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("serializing log entries")
}
