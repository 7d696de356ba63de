//! # Tutor Harness Core
//!
//! Shared, I/O-free logic for Tutor Harness: data models, text cleaning
//! and chunking, the deduplicating ingestion algorithm, confidence-scored
//! retrieval, answer-quality metrics, the learner profile and the
//! evaluation log.
//!
//! This crate contains no tokio, sqlx, network or filesystem access.
//! Everything that talks to the outside world (embedding and generation
//! providers, the vector index, the file-hash record, document parsing)
//! is reached through the traits in [`embedding`], [`generation`],
//! [`store`] and [`ingest`], and implemented by the application crate.
//!
//! ## Data flow
//!
//! ```text
//! files ──▶ ingest ──▶ chunk ──▶ embed ──▶ VectorIndex
//!                                              │
//! query ──▶ retrieve ◀─────────────────────────┘
//!              │
//!              ├──▶ answer (AnswerProvider) ──▶ metrics ──▶ evallog
//!              └──▶ context / citations
//! quiz grade ──▶ profile
//! ```

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod evallog;
pub mod generation;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod profile;
pub mod quiz;
pub mod retrieve;
pub mod store;

pub use error::TutorError;
