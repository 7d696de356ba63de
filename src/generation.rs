//! Answer generation providers.
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `disabled` | none; every call fails with a provider error |
//! | `openai` | `POST /v1/chat/completions` (`OPENAI_API_KEY`) |
//! | `ollama` | `POST /api/chat` with `stream: false` |
//!
//! Both HTTP providers share [`http::post_json`] for timeout and retry.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use tutor_harness_core::generation::AnswerProvider;
use tutor_harness_core::TutorError;

use crate::config::GenerationConfig;
use crate::embedding::DEFAULT_OLLAMA_URL;
use crate::http;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Provider used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        bail!(TutorError::Provider(
            "answer generation is disabled; set [generation] provider in the config".into()
        ))
    }
}

fn chat_messages(system: &str, user: &str) -> serde_json::Value {
    serde_json::json!([
        { "role": "system", "content": system },
        { "role": "user", "content": user },
    ])
}

/// Chat completion via the OpenAI API.
pub struct OpenAIGenerator {
    model: String,
    temperature: f64,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            client: http::client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AnswerProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": chat_messages(system, user),
        });
        let json = http::post_json(
            &self.client,
            OPENAI_CHAT_URL,
            Some(self.api_key.as_str()),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        message_content(&json["choices"][0]["message"], "OpenAI")
    }
}

/// Chat completion via a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    temperature: f64,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: format!("{}/api/chat", base.trim_end_matches('/')),
            client: http::client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AnswerProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": chat_messages(system, user),
        });
        let json = http::post_json(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        message_content(&json["message"], "Ollama")
    }
}

fn message_content(message: &serde_json::Value, label: &str) -> Result<String> {
    message
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TutorError::Provider(format!("Invalid {} response: missing message content", label))
                .into()
        })
}

/// Build the configured generator.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_generator_is_provider_error() {
        let err = DisabledGenerator.generate("s", "u").await.unwrap_err();
        assert!(matches!(
            TutorError::find(&err),
            Some(TutorError::Provider(_))
        ));
    }

    #[test]
    fn test_message_content() {
        let msg = serde_json::json!({"role": "assistant", "content": "Roots absorb water."});
        assert_eq!(message_content(&msg, "x").unwrap(), "Roots absorb water.");
        let err = message_content(&serde_json::Value::Null, "x").unwrap_err();
        assert!(TutorError::find(&err).is_some());
    }

    #[test]
    fn test_ollama_url() {
        let config = GenerationConfig {
            provider: "ollama".into(),
            url: Some("http://box:11434/".into()),
            ..GenerationConfig::default()
        };
        let g = OllamaGenerator::new(&config).unwrap();
        assert_eq!(g.url, "http://box:11434/api/chat");
    }

    #[test]
    fn test_unknown_provider() {
        let config = GenerationConfig {
            provider: "magic".into(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
