//! Ingest progress reporting.
//!
//! Renders [`IngestEvent`]s for `tutor ingest` so users see which files
//! were skipped, chunked or failed and how far embedding has got.
//! Progress goes to **stderr** so stdout stays parseable for scripts.

use std::io::Write;

use tutor_harness_core::ingest::{IngestEvent, IngestObserver, NoopObserver};

/// Human-friendly progress on stderr: `ingest  embedding  1,024 / 2,048 chunks`.
pub struct StderrProgress;

impl IngestObserver for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Skipped { file } => format!("ingest  {}  unchanged, skipped\n", file),
            IngestEvent::Failed { file, error } => format!("ingest  {}  failed: {}\n", file, error),
            IngestEvent::Chunked {
                file,
                pages,
                chunks,
            } => format!(
                "ingest  {}  {} pages → {} chunks\n",
                file,
                format_number(*pages as u64),
                format_number(*chunks as u64)
            ),
            IngestEvent::Embedding { done, total } => format!(
                "ingest  embedding  {} / {} chunks\n",
                format_number(*done as u64),
                format_number(*total as u64)
            ),
            IngestEvent::Committed { chunks } => {
                format!("ingest  committed {} chunks\n", format_number(*chunks as u64))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestObserver for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &IngestEvent) -> serde_json::Value {
    match event {
        IngestEvent::Skipped { file } => serde_json::json!({
            "event": "skipped",
            "file": file
        }),
        IngestEvent::Failed { file, error } => serde_json::json!({
            "event": "failed",
            "file": file,
            "error": error
        }),
        IngestEvent::Chunked {
            file,
            pages,
            chunks,
        } => serde_json::json!({
            "event": "chunked",
            "file": file,
            "pages": pages,
            "chunks": chunks
        }),
        IngestEvent::Embedding { done, total } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": done,
            "total": total
        }),
        IngestEvent::Committed { chunks } => serde_json::json!({
            "event": "committed",
            "chunks": chunks
        }),
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode '{}'. Use off, human, or json.", other),
        }
    }

    pub fn observer(&self) -> Box<dyn IngestObserver> {
        match self {
            ProgressMode::Off => Box::new(NoopObserver),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_event_shape() {
        let v = event_json(&IngestEvent::Embedding { done: 3, total: 10 });
        assert_eq!(v["phase"], "embedding");
        assert_eq!(v["n"], 3);
        assert_eq!(v["total"], 10);
    }

    #[test]
    fn parse_modes() {
        assert_eq!(ProgressMode::parse("json").unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::parse("off").unwrap(), ProgressMode::Off);
        assert!(ProgressMode::parse("loud").is_err());
    }
}
