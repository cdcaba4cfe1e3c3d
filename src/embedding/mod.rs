//! Embedding provider implementations.
//!
//! Concrete backends for the [`EmbeddingProvider`] trait from
//! `pdf-chat-core`:
//! - **[`DisabledProvider`]**: always errors; queries still work without an index.
//! - **[`OpenAIProvider`]**: `POST {url}/v1/embeddings`.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed`.
//! - **`LocalProvider`**: fastembed inference, no network calls after the
//!   first model download (feature `local-embeddings-fastembed`).
//!
//! Use [`create_provider`] to build the configured backend:
//!
//! ```rust
//! # use pdf_chat::config::EmbeddingConfig;
//! # use pdf_chat::embedding::create_provider;
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! Remote providers split input into `batch_size` requests and retry
//! transient failures (see [`crate::retry`]).

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use pdf_chat_core::embedding::EmbeddingProvider;
use pdf_chat_core::{RagError, RagResult};

use crate::config::EmbeddingConfig;
use crate::retry::{status_error, transport_error, with_retry, RetryPolicy};

const SERVICE: &str = "embedding";

/// Default model for the local provider, matching 384-dim sentence embeddings.
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

// ============ Disabled Provider ============

/// Placeholder used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_texts(&self, _texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Err(RagError::Configuration(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// OpenAI (or OpenAI-compatible) embeddings endpoint.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    policy: RetryPolicy,
}

impl OpenAIProvider {
    /// Build from config, reading the API key from `embedding.api_key_env`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) => key,
            Err(_) => bail!("{} environment variable not set", config.api_key_env),
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            dims,
            batch_size: config.batch_size.max(1),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/v1/embeddings", self.base_url);

        let json = with_retry(self.policy, "openai embeddings", || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;
            read_json(response).await
        })
        .await?;

        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        check_output(texts.len(), self.dims, out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index` field.
fn parse_openai_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::service(SERVICE, "invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| {
                RagError::service(SERVICE, "invalid OpenAI response: missing embedding")
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_to_vec(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// A local Ollama instance (default `http://localhost:11434`).
///
/// Requires an embedding model pulled into Ollama, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    policy: RetryPolicy,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            batch_size: config.batch_size.max(1),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);

        let json = with_retry(self.policy, "ollama embeddings", || async {
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
            read_json(response).await
        })
        .await?;

        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        check_output(texts.len(), self.dims, out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::service(SERVICE, "invalid Ollama response: missing embeddings array")
        })?;

    embeddings.iter().map(json_to_vec).collect()
}

// ============ Local Provider (fastembed) ============

/// In-process inference via fastembed.
///
/// The model is downloaded from Hugging Face on first use, cached, and
/// kept loaded for the life of the provider. Inference runs on the
/// blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    policy: RetryPolicy,
    model: Arc<parking_lot::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        // Fail fast on unknown names rather than at the first upload.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size.max(1),
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
            model: Arc::new(parking_lot::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = self.batch_size;
        let texts = Arc::new(texts.to_vec());

        let vectors = with_retry(self.policy, "local embeddings", || {
            let slot = Arc::clone(&self.model);
            let model_name = self.model_name.clone();
            let texts = Arc::clone(&texts);
            async move {
                tokio::task::spawn_blocking(move || {
                    run_local_model(&slot, &model_name, &texts, batch_size)
                })
                .await
                .map_err(|e| {
                    RagError::transient(SERVICE, format!("embedding task failed: {}", e))
                })?
            }
        })
        .await?;

        check_output(texts.len(), self.dims, vectors)
    }
}

/// Load the model into `slot` on first use, then embed `texts`.
///
/// A model that cannot be downloaded or loaded is left unloaded so the next
/// attempt tries again.
#[cfg(feature = "local-embeddings-fastembed")]
fn run_local_model(
    slot: &parking_lot::Mutex<Option<fastembed::TextEmbedding>>,
    model_name: &str,
    texts: &[String],
    batch_size: usize,
) -> RagResult<Vec<Vec<f32>>> {
    let mut guard = slot.lock();
    if guard.is_none() {
        let kind = config_to_fastembed_model(model_name)
            .map_err(|e| RagError::Configuration(e.to_string()))?;
        tracing::info!(model = %model_name, "loading local embedding model");
        let loaded = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(kind).with_show_download_progress(false),
        )
        .map_err(local_init_error)?;
        *guard = Some(loaded);
    }
    let model = guard
        .as_mut()
        .ok_or_else(|| RagError::transient(SERVICE, "local model not loaded"))?;
    model
        .embed(texts, Some(batch_size))
        .map_err(local_inference_error)
}

/// Download or load failures are an unavailable model, retried with backoff.
#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(dead_code))]
fn local_init_error(err: impl std::fmt::Display) -> RagError {
    RagError::transient(
        SERVICE,
        format!("failed to initialize local embedding model: {}", err),
    )
}

/// Inference on a loaded model fails the same way every time.
#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(dead_code))]
fn local_inference_error(err: impl std::fmt::Display) -> RagError {
    RagError::service(SERVICE, format!("local embedding failed: {}", err))
}

/// Model name and dimensionality for the local provider.
pub fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (needs `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Shared helpers ============

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Turn a response into JSON, classifying non-2xx statuses.
pub(crate) async fn read_json_from(
    service: &'static str,
    response: reqwest::Response,
) -> RagResult<serde_json::Value> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| {
            RagError::service(service, format!("invalid JSON response: {}", e))
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &body))
}

async fn read_json(response: reqwest::Response) -> RagResult<serde_json::Value> {
    read_json_from(SERVICE, response).await
}

fn json_to_vec(value: &serde_json::Value) -> RagResult<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| RagError::service(SERVICE, "embedding is not an array"))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::service(SERVICE, "embedding contains a non-number"))
        })
        .collect()
}

/// One vector per input, each of the advertised dimensionality.
fn check_output(
    expected: usize,
    dims: usize,
    vectors: Vec<Vec<f32>>,
) -> RagResult<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(RagError::service(
            SERVICE,
            format!("expected {} vectors, received {}", expected, vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            found: bad.len(),
        });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({ "object": "list" })).unwrap_err();
        assert!(matches!(err, RagError::Service { .. }));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25], [1.0, 2.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 2.0]);
    }

    #[test]
    fn test_check_output_rejects_wrong_dims() {
        let err = check_output(1, 3, vec![vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn test_resolve_local_model_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(
            resolve_local_model(&config),
            ("all-minilm-l6-v2".to_string(), 384)
        );
    }

    #[test]
    fn test_local_model_load_failure_is_retryable() {
        let err = local_init_error("Failed to retrieve onnx/model.onnx");
        assert!(err.is_transient());
        assert!(err.to_string().contains("onnx/model.onnx"));

        let err = local_inference_error("input tensor shape mismatch");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_local_model_load_is_retried() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(RetryPolicy::new(2, 1), "local embeddings", || async {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err::<(), _>(local_init_error("connection reset"))
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider
            .embed_texts(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
