//! Error taxonomy shared by the core pipeline and its adapters.
//!
//! Pipeline functions return `anyhow::Result`; failures that callers need
//! to tell apart are raised as a [`TutorError`] so they can be recovered
//! with [`TutorError::find`] (a `downcast_ref` over the error chain).

use thiserror::Error;

/// Classified failures of the tutoring pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TutorError {
    /// An embedding or generation call failed (network, auth, rate limit).
    #[error("provider error: {0}")]
    Provider(String),

    /// A generative model returned output that does not match the expected schema.
    #[error("could not parse model output: {0}")]
    Parse(String),

    /// The operation needs retrieved context and none is available.
    #[error("no context available: {0}")]
    EmptyContext(String),

    /// Malformed caller input; no state was changed.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The vector index cannot produce calibrated relevance scores.
    #[error("relevance scores unavailable: {0}")]
    ScoresUnavailable(String),
}

impl TutorError {
    /// Find a [`TutorError`] anywhere in an `anyhow` error chain.
    pub fn find(err: &anyhow::Error) -> Option<&TutorError> {
        err.chain().find_map(|e| e.downcast_ref::<TutorError>())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::Provider(_) => "provider_error",
            TutorError::Parse(_) => "parse_error",
            TutorError::EmptyContext(_) => "empty_context",
            TutorError::Validation(_) => "bad_request",
            TutorError::ScoresUnavailable(_) => "scores_unavailable",
        }
    }
}
