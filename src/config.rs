//! TOML configuration parsing and validation.
//!
//! Every section except `[index]` has defaults, so a minimal config only
//! needs the snapshot path. See `config/pdfchat.example.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use pdf_chat_core::chunk::{ChunkUnit, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
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
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Snapshot file the shared index is persisted to.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub unit: ChunkUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            unit: ChunkUnit::Chars,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl ChunkingConfig {
    pub fn chunker(&self) -> pdf_chat_core::RagResult<Chunker> {
        Chunker::new(self.chunk_size, self.chunk_overlap, self.unit)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env_openai")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env_openai(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_api_key_env_openai() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key (defaults per provider).
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_generation_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    512
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_max_upload_mb() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `"info"` or `"pdf_chat=debug,warn"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// In-code defaults with the index under `./data`.
    pub fn minimal() -> Self {
        Self {
            index: IndexConfig {
                path: PathBuf::from("./data/index.json"),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() {
                    bail!(
                        "embedding.dims must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.generation.provider.as_str() {
            "disabled" | "gemini" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled, gemini, openai, or ollama.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }

        if self.server.max_upload_mb == 0 {
            bail!("server.max_upload_mb must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let cfg = parse_config("[index]\npath = \"/tmp/idx.json\"\n").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.chunking.unit, ChunkUnit::Chars);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.generation.provider, "gemini");
        assert_eq!(cfg.server.bind, "127.0.0.1:5000");
    }

    #[test]
    fn test_full_file() {
        let cfg = parse_config(
            r#"
[index]
path = "./data/index.json"

[chunking]
chunk_size = 4
chunk_overlap = 0
unit = "words"

[retrieval]
top_k = 5

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
url = "http://localhost:11434"

[generation]
provider = "ollama"
model = "llama3"
temperature = 0.0

[server]
bind = "0.0.0.0:8080"
max_upload_mb = 8

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.unit, ChunkUnit::Words);
        assert_eq!(cfg.embedding.dims, Some(768));
        assert_eq!(cfg.generation.model.as_deref(), Some("llama3"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.chunking.chunker().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config(
            "[index]\npath = \"i.json\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[index]\npath = \"i.json\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[index]\npath = \"i.json\"\n[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let err = parse_config("[index]\npath = \"i.json\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(Config::minimal().validate().is_ok());
    }
}
