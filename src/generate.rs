//! Answer generation backends.
//!
//! Defines the [`Generator`] trait and two backends selected at
//! construction time via [`create_generator`]:
//! - **[`OllamaGenerator`]** — a locally served sequence model
//!   (`POST /api/generate` on an Ollama instance); no credential.
//! - **[`OpenAiChatGenerator`]** — a remote OpenAI-compatible chat API;
//!   reads `OPENAI_API_KEY` at construction and fails there with
//!   [`GeneratorError::MissingCredential`] before any network call.
//!
//! Backends make exactly one attempt per call. Retrying transient failures
//! is the caller's policy, not the backend's.
//!
//! A deterministic configuration (temperature pinned to 0, fixed seed where
//! the backend supports one) returns the same answer for the same prompt
//! and params; sampling configurations are explicitly non-deterministic.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Error type for generator construction and calls.
#[derive(Debug)]
pub enum GeneratorError {
    /// The backend requires a credential that is not in the environment.
    MissingCredential(String),
    Api { status: u16, body: String },
    EmptyResponse,
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::MissingCredential(var) => {
                write!(f, "missing generation credential: {} is not set", var)
            }
            GeneratorError::Api { status, body } => {
                write!(f, "generation API error {}: {}", status, body)
            }
            GeneratorError::EmptyResponse => write!(f, "generation backend returned no text"),
        }
    }
}

impl std::error::Error for GeneratorError {}

/// Decoding parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum output length in tokens.
    pub max_tokens: usize,
    /// Sampling temperature; ignored when `deterministic` is set.
    pub temperature: f32,
    /// Greedy decoding with a pinned seed instead of sampling.
    pub deterministic: bool,
}

impl GenerationParams {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            deterministic: config.deterministic,
        }
    }
}

/// Trait for answer-generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend identifier for logs and stats output.
    fn name(&self) -> &str;
    /// Turn a prompt into an answer. One attempt; no internal retry.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Create the [`Generator`] named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAiChatGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Ollama backend (local sequence model) ============

/// Generation via a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

/// Seed pinned for deterministic decoding. Any fixed value works; what
/// matters is that repeated calls share it.
const DETERMINISTIC_SEED: u64 = 42;

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let mut options = serde_json::json!({
            "num_predict": params.max_tokens,
            "temperature": if params.deterministic { 0.0 } else { params.temperature },
        });
        if params.deterministic {
            options["seed"] = serde_json::json!(DETERMINISTIC_SEED);
        }

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("Ollama connection error (is Ollama running at {}?): {}", self.url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body: body_text,
            }
            .into());
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_generate_response(&json)
    }
}

fn parse_ollama_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GeneratorError::EmptyResponse.into())
}

// ============ OpenAI-compatible chat backend ============

/// Generation via a remote OpenAI-compatible chat completions API.
pub struct OpenAiChatGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

/// Environment variable holding the remote chat credential.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

impl OpenAiChatGenerator {
    /// Fails with [`GeneratorError::MissingCredential`] when the key is not
    /// in the environment. No request is attempted without it.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_VAR)
            .map_err(|_| GeneratorError::MissingCredential(OPENAI_API_KEY_VAR.to_string()))?;

        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAiChatGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": params.max_tokens,
            "temperature": if params.deterministic { 0.0 } else { params.temperature },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body: body_text,
            }
            .into());
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GeneratorError::EmptyResponse.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_completion_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Paris."}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Paris.");
    }

    #[test]
    fn chat_response_without_choices_is_an_error() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&json).is_err());
    }

    #[test]
    fn parses_ollama_generate_response() {
        let json = serde_json::json!({"model": "llama3.2", "response": "An answer.", "done": true});
        assert_eq!(parse_ollama_generate_response(&json).unwrap(), "An answer.");
    }

    #[test]
    fn missing_credential_fails_at_construction() {
        // Isolate from a developer's real environment.
        let prior = std::env::var(OPENAI_API_KEY_VAR).ok();
        std::env::remove_var(OPENAI_API_KEY_VAR);

        let config = GenerationConfig {
            provider: "openai".to_string(),
            ..GenerationConfig::default()
        };
        let err = OpenAiChatGenerator::new(&config).map(|_| ()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GeneratorError>(),
            Some(GeneratorError::MissingCredential(_))
        ));

        if let Some(value) = prior {
            std::env::set_var(OPENAI_API_KEY_VAR, value);
        }
    }
}
