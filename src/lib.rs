//! # Tutor Harness
//!
//! A local-first, retrieval-augmented tutoring tool over your own course
//! material.
//!
//! Tutor Harness ingests PDFs, Word documents and notes, chunks and embeds
//! them into SQLite, and answers learner questions from the retrieved
//! chunks with a confidence verdict, citations and answer-quality metrics.
//! Every interaction is logged for later export, and quiz results feed a
//! learner profile that tracks weak concepts.
//!
//! The pure algorithms live in the `tutor-harness-core` crate; this crate
//! wires them to SQLite, HTTP providers, the filesystem, a CLI and an HTTP
//! server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Files / API │──▶│   Pipeline   │──▶│  SQLite  │
//! │ PDF DOCX MD │   │ Chunk+Embed  │   │ chunks   │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │ (tutor)  │        │ sessions │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tutor init
//! tutor ingest ./notes
//! tutor ask "what is osmosis"
//! tutor serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | Database connection and schema |
//! | [`sqlite_store`] | SQLite vector index and file-hash record |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generation providers |
//! | [`http`] | Shared timeout and retry for provider calls |
//! | [`extract`] | PDF, DOCX and text extraction |
//! | [`scan`] | Directory walking |
//! | [`ingest`] | Ingestion command |
//! | [`session`] | Chat turns, quizzes and grading |
//! | [`ask`] | One-shot ask and retrieve commands |
//! | [`quiz`] | Quiz and grade commands |
//! | [`export`] | Persisted interaction log and export |
//! | [`progress`] | Ingest progress reporting |
//! | [`stats`] | Index statistics |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod quiz;
pub mod scan;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod stats;
