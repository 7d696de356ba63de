//! # Tutor Harness CLI (`tutor`)
//!
//! The `tutor` binary is the primary interface for Tutor Harness. It provides
//! commands for database initialization, course material ingestion,
//! retrieval, single chat turns, log export and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor init` | Create the SQLite database and run schema migrations |
//! | `tutor ingest <paths>...` | Ingest files or directories |
//! | `tutor ask "<query>"` | One chat turn against the indexed material |
//! | `tutor retrieve "<query>"` | Retrieval only, with confidence |
//! | `tutor quiz [--topic T]` | Generate a quiz as JSON |
//! | `tutor grade --quiz Q --answers A` | Grade answers and record the score |
//! | `tutor metrics --hypothesis H --reference R` | ROUGE-L and BLEU as JSON |
//! | `tutor logs export` | Export the persisted interaction log |
//! | `tutor stats` | Index statistics |
//! | `tutor clear` | Delete all chunks and file hashes |
//! | `tutor serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! tutor init
//! tutor ingest ./notes --course bio101
//! tutor retrieve "what is osmosis"
//! tutor ask "explain osmosis with an example"
//! tutor quiz --topic osmosis --output ./quiz.json
//! tutor grade --quiz ./quiz.json --answers ./answers.json
//! tutor logs export --format csv --output ./logs.csv
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tutor_harness::config;
use tutor_harness::export::{self, LogFormat};
use tutor_harness::progress::ProgressMode;
use tutor_harness::{ask, ingest, migrate, quiz, server, stats};

use tutor_harness_core::metrics::{compute_bleu, compute_rouge_l};

/// Tutor Harness CLI: retrieval-augmented tutoring over your own course material.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tutor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Tutor Harness: retrieval-augmented tutoring over your own course material",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running
    /// it multiple times is safe.
    Init,

    /// Ingest course material.
    ///
    /// Files whose content is unchanged since the last ingestion are
    /// skipped. Directories are walked with the configured include and
    /// exclude globs.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Course identifier stored with each chunk.
        #[arg(long)]
        course: Option<String>,

        /// Uploader name stored with each chunk.
        #[arg(long)]
        uploaded_by: Option<String>,

        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Ask one question and print the answer, citations and metrics.
    Ask {
        query: String,

        /// Override `retrieval.top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Retrieve the chunks most relevant to a query.
    Retrieve {
        query: String,

        /// Override `retrieval.top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Generate a quiz over the indexed material.
    Quiz {
        /// Topic to quiz on; defaults to the `[learner]` course.
        #[arg(long)]
        topic: Option<String>,

        /// Number of questions (1 to 20).
        #[arg(long, default_value_t = 5)]
        num_questions: usize,

        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Grade answers to a quiz written by `tutor quiz`.
    ///
    /// The score is recorded on the most recent logged interaction.
    Grade {
        /// Quiz JSON file.
        #[arg(long)]
        quiz: PathBuf,

        /// JSON array of answers, one per question in order.
        #[arg(long)]
        answers: PathBuf,

        /// Concept to record the score under; defaults to the quiz topic.
        #[arg(long)]
        concept: Option<String>,
    },

    /// Score a hypothesis against a reference text.
    Metrics {
        #[arg(long)]
        hypothesis: String,
        #[arg(long)]
        reference: String,
    },

    /// Manage the persisted interaction log.
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// Show index statistics.
    Stats,

    /// Delete all chunks and reset the file-hash record.
    Clear,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum LogsAction {
    /// Export logged interactions as CSV or JSON.
    Export {
        /// `csv` or `json`.
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Metrics need no config or database.
    if let Commands::Metrics {
        hypothesis,
        reference,
    } = &cli.command
    {
        let rouge = compute_rouge_l(hypothesis, reference);
        let bleu = compute_bleu(hypothesis, reference);
        let out = serde_json::json!({
            "rouge_l": rouge,
            "bleu": bleu.bleu,
            "bleu_precisions": bleu.precisions,
            "bleu_scored_orders": bleu.scored_orders,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            course,
            uploaded_by,
            progress,
        } => {
            let mode = match progress {
                Some(value) => ProgressMode::parse(&value)?,
                None => ProgressMode::default_for_tty(),
            };
            ingest::run_ingest(&cfg, &paths, course.as_deref(), uploaded_by.as_deref(), mode)
                .await?;
        }
        Commands::Ask { query, top_k } => {
            ask::run_ask(&cfg, &query, top_k).await?;
        }
        Commands::Retrieve { query, top_k } => {
            ask::run_retrieve(&cfg, &query, top_k).await?;
        }
        Commands::Quiz {
            topic,
            num_questions,
            output,
        } => {
            quiz::run_quiz(&cfg, topic.as_deref(), num_questions, output.as_deref()).await?;
        }
        Commands::Grade {
            quiz: quiz_path,
            answers,
            concept,
        } => {
            quiz::run_grade(&cfg, &quiz_path, &answers, concept.as_deref()).await?;
        }
        Commands::Logs { action } => match action {
            LogsAction::Export { format, output } => {
                let format = LogFormat::parse(&format)?;
                export::run_export(&cfg, format, output.as_deref()).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear => {
            ingest::run_clear(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Metrics { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
