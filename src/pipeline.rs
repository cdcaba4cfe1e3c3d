//! Ingestion and query orchestration over one shared vector index.
//!
//! # State
//!
//! The process holds at most one index. [`IndexHandle`] wraps an
//! [`IndexState`] behind a `parking_lot::RwLock`:
//!
//! ```text
//! NoIndex ──ingest ok──▶ Ready(v1) ──ingest ok──▶ Ready(v2) ...
//! ```
//!
//! Readers take the read lock only long enough to clone the inner `Arc`,
//! so a query that started against `v1` finishes against `v1` even if
//! `v2` is published meanwhile. An ingestion builds its index in
//! isolation, persists it, and only then swaps it in; any failure along
//! the way leaves both the in-memory state and the snapshot on disk as
//! they were. Ingestions are serialized by an async mutex.
//!
//! # Ingestion
//!
//! ```text
//! Document ──▶ extract ──▶ chunk ──▶ embed ──▶ VectorIndex ──▶ persist ──▶ publish
//! ```
//!
//! # Query
//!
//! ```text
//! question ──▶ embed ──▶ search top-k ──▶ compose prompt ──▶ generate
//! ```
//!
//! With no index the query skips retrieval and sends the bare question.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use pdf_chat_core::chunk::Chunker;
use pdf_chat_core::embedding::EmbeddingProvider;
use pdf_chat_core::index::VectorIndex;
use pdf_chat_core::models::SearchHit;
use pdf_chat_core::prompt::compose_prompt;
use pdf_chat_core::{RagError, RagResult};

use crate::config::Config;
use crate::extract::{content_type_for_path, DocumentExtractor, TextExtractor, MIME_TEXT};
use crate::generation::Generator;

/// A published index and its version (1 for the first, +1 per ingestion).
#[derive(Debug)]
pub struct LoadedIndex {
    pub version: u64,
    pub index: VectorIndex,
}

#[derive(Debug, Clone)]
pub enum IndexState {
    NoIndex,
    Ready(Arc<LoadedIndex>),
}

/// Shared, versioned slot holding the current index.
#[derive(Debug)]
pub struct IndexHandle {
    state: RwLock<IndexState>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::NoIndex),
        }
    }

    /// Start out `Ready` with `index` as version 1.
    #[cfg(test)]
    pub(crate) fn with_index(index: VectorIndex) -> Self {
        let handle = Self::new();
        handle.publish(index);
        handle
    }

    pub fn state(&self) -> IndexState {
        self.state.read().clone()
    }

    pub fn current(&self) -> Option<Arc<LoadedIndex>> {
        match &*self.state.read() {
            IndexState::NoIndex => None,
            IndexState::Ready(loaded) => Some(Arc::clone(loaded)),
        }
    }

    /// Replace the current index. Returns the new version.
    pub fn publish(&self, index: VectorIndex) -> u64 {
        let mut guard = self.state.write();
        let version = match &*guard {
            IndexState::NoIndex => 1,
            IndexState::Ready(prev) => prev.version + 1,
        };
        *guard = IndexState::Ready(Arc::new(LoadedIndex { version, index }));
        version
    }
}

/// Raw upload handed to [`Pipeline::ingest`].
#[derive(Debug, Clone)]
pub struct Document {
    /// Original file name, kept as chunk metadata.
    pub name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: Option<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Some(name.into()), MIME_TEXT, text.into().into_bytes())
    }

    /// Read a file, inferring its content type from the extension.
    pub fn from_path(path: &Path) -> RagResult<Self> {
        let content_type = content_type_for_path(path).ok_or_else(|| {
            RagError::InvalidInput(format!(
                "cannot determine document type of {}",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, content_type, bytes))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunk_count: usize,
    pub document_id: String,
    pub version: u64,
}

/// Ranked context for one question and the prompt built from it.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub hits: Vec<SearchHit>,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Whether any indexed context was supplied to the generator.
    pub grounded: bool,
    pub sources: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IndexStatus {
    Empty,
    Ready {
        version: u64,
        entries: usize,
        dims: usize,
        model: String,
        created_at: DateTime<Utc>,
    },
}

/// Static pipeline parameters.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunker: Chunker,
    pub top_k: usize,
    pub index_path: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> RagResult<Self> {
        Ok(Self {
            chunker: config.chunking.chunker()?,
            top_k: config.retrieval.top_k.max(1),
            index_path: config.index.path.clone(),
        })
    }
}

/// Owns the shared index and the external collaborators.
pub struct Pipeline {
    settings: PipelineSettings,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    extractor: Arc<dyn TextExtractor>,
    index: IndexHandle,
    ingest_lock: tokio::sync::Mutex<()>,
}

impl Pipeline {
    /// Build a pipeline with no index loaded.
    pub fn new(
        settings: PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            settings,
            embedder,
            generator,
            extractor: Arc::new(DocumentExtractor),
            index: IndexHandle::new(),
            ingest_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Build a pipeline and load the snapshot at `settings.index_path`, if any.
    ///
    /// A snapshot whose dimensionality differs from the embedder's is an
    /// error rather than being silently discarded.
    pub async fn open(
        settings: PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> RagResult<Self> {
        let pipeline = Self::new(settings, embedder, generator);
        pipeline.load_snapshot().await?;
        Ok(pipeline)
    }

    /// Build providers from `config` and open the pipeline.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let settings = PipelineSettings::from_config(config)?;
        let embedder = crate::embedding::create_provider(&config.embedding)?;
        let generator = crate::generation::create_generator(&config.generation)?;
        Ok(Self::open(settings, embedder, generator).await?)
    }

    async fn load_snapshot(&self) -> RagResult<()> {
        let dims = self.embedder.dims();
        if dims == 0 {
            warn!("embeddings disabled; not loading index snapshot");
            return Ok(());
        }
        let path = self.settings.index_path.clone();
        let loaded = tokio::task::spawn_blocking(move || VectorIndex::load(&path, dims))
            .await
            .map_err(join_error)??;

        match loaded {
            Some(index) => {
                if index.model() != self.embedder.model_name() {
                    warn!(
                        snapshot_model = index.model(),
                        embedder_model = self.embedder.model_name(),
                        "index snapshot was built with a different embedding model"
                    );
                }
                info!(
                    path = %self.settings.index_path.display(),
                    entries = index.len(),
                    "loaded index snapshot"
                );
                self.index.publish(index);
            }
            None => debug!(path = %self.settings.index_path.display(), "no index snapshot"),
        }
        Ok(())
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn status(&self) -> IndexStatus {
        match self.index.state() {
            IndexState::NoIndex => IndexStatus::Empty,
            IndexState::Ready(loaded) => IndexStatus::Ready {
                version: loaded.version,
                entries: loaded.index.len(),
                dims: loaded.index.dims(),
                model: loaded.index.model().to_string(),
                created_at: loaded.index.created_at(),
            },
        }
    }

    /// Extract, chunk, embed and index `document`, replacing the current index.
    pub async fn ingest(&self, document: Document) -> RagResult<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let Document {
            name,
            content_type,
            bytes,
        } = document;
        let byte_len = bytes.len();
        let extractor = Arc::clone(&self.extractor);
        let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &content_type))
            .await
            .map_err(join_error)??;

        let document_id = uuid::Uuid::new_v4().to_string();
        let index = self
            .build_index(&document_id, &text, name.as_deref())
            .await?;
        let chunk_count = index.len();

        let path = self.settings.index_path.clone();
        let index = tokio::task::spawn_blocking(move || index.persist(&path).map(|()| index))
            .await
            .map_err(join_error)??;
        let version = self.index.publish(index);

        info!(
            document = name.as_deref().unwrap_or("<unnamed>"),
            document_id = %document_id,
            bytes = byte_len,
            chunks = chunk_count,
            version,
            "document ingested"
        );
        Ok(IngestReport {
            chunk_count,
            document_id,
            version,
        })
    }

    /// Chunk and embed `text` into a fresh index without publishing it.
    async fn build_index(
        &self,
        document_id: &str,
        text: &str,
        source_name: Option<&str>,
    ) -> RagResult<VectorIndex> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument);
        }
        let chunks = self.settings.chunker.chunk(document_id, text);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        debug!(chunks = chunks.len(), model = self.embedder.model_name(), "embedded chunks");

        VectorIndex::from_chunks(
            self.embedder.model_name(),
            self.embedder.dims(),
            &chunks,
            vectors,
            source_name,
        )
    }

    /// Top-`k` chunks for `question`; empty when no index exists.
    pub async fn retrieve(&self, question: &str, k: usize) -> RagResult<Vec<SearchHit>> {
        let question = validate_question(question)?;
        let Some(loaded) = self.index.current() else {
            return Ok(Vec::new());
        };
        let query = self.embedder.embed_query(question).await?;
        loaded.index.search(&query, k)
    }

    /// Retrieve context and compose the prompt, without generating.
    pub async fn prepare(&self, question: &str, k: Option<usize>) -> RagResult<RetrievedContext> {
        let k = self.resolve_k(k)?;
        let hits = self.retrieve(question, k).await?;
        let prompt = compose_prompt(&hit_texts(&hits), question.trim());
        Ok(RetrievedContext { hits, prompt })
    }

    /// Answer `question` from the shared index (`k` defaults to `retrieval.top_k`).
    pub async fn query(&self, question: &str, k: Option<usize>) -> RagResult<QueryAnswer> {
        let context = self.prepare(question, k).await?;
        self.answer(context).await
    }

    /// Answer `question` over `text` alone using a throwaway index.
    ///
    /// The shared index is neither read nor modified.
    pub async fn ask(
        &self,
        text: &str,
        question: &str,
        k: Option<usize>,
    ) -> RagResult<QueryAnswer> {
        let k = self.resolve_k(k)?;
        let question = validate_question(question)?;
        let document_id = uuid::Uuid::new_v4().to_string();
        let index = self.build_index(&document_id, text, None).await?;

        let query = self.embedder.embed_query(question).await?;
        let hits = index.search(&query, k)?;
        let prompt = compose_prompt(&hit_texts(&hits), question);
        self.answer(RetrievedContext { hits, prompt }).await
    }

    async fn answer(&self, context: RetrievedContext) -> RagResult<QueryAnswer> {
        let RetrievedContext { hits, prompt } = context;
        debug!(
            context_chunks = hits.len(),
            prompt_len = prompt.len(),
            model = self.generator.model_name(),
            "generating answer"
        );
        let answer = self.generator.generate(&prompt).await?;
        Ok(QueryAnswer {
            answer,
            grounded: !hits.is_empty(),
            sources: hits,
        })
    }

    fn resolve_k(&self, k: Option<usize>) -> RagResult<usize> {
        match k {
            None => Ok(self.settings.top_k),
            Some(0) => Err(RagError::InvalidInput("k must be at least 1".to_string())),
            Some(k) => Ok(k),
        }
    }
}

fn validate_question(question: &str) -> RagResult<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidInput("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

fn hit_texts(hits: &[SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.text.as_str()).collect()
}

fn join_error(err: tokio::task::JoinError) -> RagError {
    RagError::Io(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(text: &str) -> VectorIndex {
        let mut index = VectorIndex::new("m", 2).unwrap();
        index.insert(vec![1.0, 0.0], text).unwrap();
        index
    }

    #[test]
    fn test_handle_starts_empty() {
        let handle = IndexHandle::new();
        assert!(matches!(handle.state(), IndexState::NoIndex));
        assert!(handle.current().is_none());
    }

    #[test]
    fn test_publish_increments_version() {
        let handle = IndexHandle::new();
        assert_eq!(handle.publish(index_with("one")), 1);
        assert_eq!(handle.publish(index_with("two")), 2);
        let current = handle.current().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.index.entries()[0].text, "two");
    }

    #[test]
    fn test_reader_keeps_its_snapshot_across_publish() {
        let handle = IndexHandle::with_index(index_with("old"));
        let reader = handle.current().unwrap();
        handle.publish(index_with("new"));

        assert_eq!(reader.version, 1);
        assert_eq!(reader.index.entries()[0].text, "old");
        assert_eq!(handle.current().unwrap().index.entries()[0].text, "new");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(IndexStatus::Empty).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "empty" }));
    }

    #[test]
    fn test_blank_question_rejected() {
        assert!(matches!(
            validate_question("  \n"),
            Err(RagError::InvalidInput(_))
        ));
        assert_eq!(validate_question("  why? ").unwrap(), "why?");
    }
}
