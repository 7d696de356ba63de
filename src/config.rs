//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates; invalid values are
//! rejected with a message naming the offending key.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tutor_harness_core::chunk::ChunkingParams;
use tutor_harness_core::ingest::IngestOptions;
use tutor_harness_core::profile::{LearnerProfile, SkillLevel};
use tutor_harness_core::retrieve::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LearnerConfig {
    #[serde(default = "default_learner_name")]
    pub name: String,
    #[serde(default = "default_course")]
    pub course: String,
    #[serde(default = "default_skill_level")]
    pub skill_level: String,
    #[serde(default = "default_goals")]
    pub goals: String,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            name: default_learner_name(),
            course: default_course(),
            skill_level: default_skill_level(),
            goals: default_goals(),
        }
    }
}

fn default_learner_name() -> String {
    "Learner".to_string()
}
fn default_course() -> String {
    "General".to_string()
}
fn default_skill_level() -> String {
    "Intermediate".to_string()
}
fn default_goals() -> String {
    "Learn and understand the material".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_course_id")]
    pub course_id: String,
    #[serde(default = "default_uploaded_by")]
    pub uploaded_by: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            course_id: default_course_id(),
            uploaded_by: default_uploaded_by(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.docx".to_string(),
    ]
}
fn default_course_id() -> String {
    "general".to_string()
}
fn default_uploaded_by() -> String {
    "learner".to_string()
}

impl Config {
    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.retrieval.top_k,
            similarity_threshold: self.retrieval.similarity_threshold,
        }
    }

    /// Ingestion options, with optional per-call overrides.
    pub fn ingest_options(&self, course_id: Option<&str>, uploaded_by: Option<&str>) -> IngestOptions {
        IngestOptions {
            course_id: course_id.unwrap_or(&self.ingest.course_id).to_string(),
            uploaded_by: uploaded_by.unwrap_or(&self.ingest.uploaded_by).to_string(),
            chunking: self.chunking_params(),
            batch_size: self.embedding.batch_size,
        }
    }

    /// A fresh profile from the `[learner]` section.
    pub fn learner_profile(&self) -> Result<LearnerProfile> {
        let skill: SkillLevel = self.learner.skill_level.parse()?;
        Ok(LearnerProfile::new(
            self.learner.name.clone(),
            self.learner.course.clone(),
            skill,
            self.learner.goals.clone(),
        ))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !config.retrieval.similarity_threshold.is_finite() {
        anyhow::bail!("retrieval.similarity_threshold must be a finite number");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "token" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, token, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    config
        .learner
        .skill_level
        .parse::<SkillLevel>()
        .with_context(|| "Invalid learner.skill_level")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/tutor.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.similarity_threshold, 0.3);
        assert_eq!(config.embedding.max_retries, 2);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
        assert_eq!(config.ingest.include_globs.len(), 4);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_dims_and_model() {
        let err = parse_config("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"token\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let ok = parse_config(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"token\"\nmodel = \"token-hash\"\ndims = 64\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_learner_profile_from_config() {
        let config = parse_config(
            "[db]\npath = \"x\"\n[learner]\nname = \"Ada\"\nskill_level = \"advanced\"\n",
        )
        .unwrap();
        let profile = config.learner_profile().unwrap();
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.skill_level, SkillLevel::Advanced);
        assert!(parse_config("[db]\npath = \"x\"\n[learner]\nskill_level = \"guru\"\n").is_err());
    }
}
