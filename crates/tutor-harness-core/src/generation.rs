//! Generative model abstraction.
//!
//! The tutoring flow needs exactly one thing from a language model: a
//! completion for a system instruction plus a user message. HTTP-backed
//! implementations live in the app crate.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Produce a completion. Failures should surface as
    /// [`TutorError::Provider`](crate::TutorError::Provider).
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}
