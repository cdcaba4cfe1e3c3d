//! Answer generation via hosted or local LLMs.
//!
//! - **[`DisabledGenerator`]**: always errors.
//! - **[`GeminiGenerator`]**: `POST {url}/v1beta/models/{model}:generateContent`.
//! - **[`OpenAIGenerator`]**: `POST {url}/v1/chat/completions`.
//! - **[`OllamaGenerator`]**: `POST {url}/api/generate` with `stream: false`.
//!
//! All remote generators share the retry policy in [`crate::retry`]:
//! transient failures are retried, client errors surface immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use pdf_chat_core::{RagError, RagResult};

use crate::config::GenerationConfig;
use crate::embedding::{http_client, read_json_from};
use crate::retry::{transport_error, with_retry, RetryPolicy};

const SERVICE: &str = "generation";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Turns a prompt into a completion.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> RagResult<String>;
}

/// Sampling parameters common to every backend.
#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_output_tokens: u32,
}

impl Sampling {
    fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

fn api_key_from_env(config: &GenerationConfig, default_env: &str) -> Result<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

fn base_url(config: &GenerationConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> RagResult<String> {
        Err(RagError::Configuration(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ Gemini ============

/// Google Gemini `generateContent`.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    sampling: Sampling,
    policy: RetryPolicy,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key = api_key_from_env(config, "GEMINI_API_KEY")?;
        Self::with_api_key(config, key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config, "https://generativelanguage.googleapis.com"),
            api_key: api_key.into(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            sampling: Sampling::from_config(config),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "maxOutputTokens": self.sampling.max_output_tokens,
            }
        });

        let json = with_retry(self.policy, "gemini generate", || async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;
            read_json_from(SERVICE, response).await
        })
        .await?;

        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> RagResult<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        return Err(RagError::service(
            SERVICE,
            format!("Gemini returned no answer: {}", reason),
        ));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RagError::service(SERVICE, "invalid Gemini response: missing parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text)
}

// ============ OpenAI ============

/// OpenAI (or compatible) chat completions.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    sampling: Sampling,
    policy: RetryPolicy,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key = api_key_from_env(config, "OPENAI_API_KEY")?;
        Self::with_api_key(config, key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config, "https://api.openai.com"),
            api_key: api_key.into(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            sampling: Sampling::from_config(config),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.sampling.temperature,
            "max_tokens": self.sampling.max_output_tokens,
        });

        let json = with_retry(self.policy, "openai chat", || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;
            read_json_from(SERVICE, response).await
        })
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::service(SERVICE, "invalid OpenAI response: missing content"))
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    sampling: Sampling,
    policy: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: base_url(config, "http://localhost:11434"),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            sampling: Sampling::from_config(config),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let endpoint = format!("{}/api/generate", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.sampling.temperature,
                "num_predict": self.sampling.max_output_tokens,
            }
        });

        let json = with_retry(self.policy, "ollama generate", || async {
            let response = self
                .client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    RagError::transient(
                        SERVICE,
                        format!(
                            "Ollama connection error (is Ollama running at {}?): {}",
                            self.url, e
                        ),
                    )
                })?;
            read_json_from(SERVICE, response).await
        })
        .await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::service(SERVICE, "invalid Ollama response: missing response"))
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gemini_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello, " }, { "text": "world." }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Hello, world.");
    }

    #[test]
    fn test_parse_gemini_blocked_prompt() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        let err = DisabledGenerator.generate("hi").await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = GenerationConfig {
            provider: "ollama".to_string(),
            ..GenerationConfig::default()
        };
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.model_name(), DEFAULT_OLLAMA_MODEL);
    }
}
