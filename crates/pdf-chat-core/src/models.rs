//! Core data models used throughout pdf-chat.
//!
//! These types represent the chunks, document metadata, and retrieval hits
//! that flow through the ingestion and query pipeline.

use serde::{Deserialize, Serialize};

/// A contiguous span of a document's text.
///
/// `start` and `end` are offsets in the chunker's unit (characters or
/// words), half-open: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub start: usize,
    pub end: usize,
}

/// Metadata about the document an index entry was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub document_id: String,
    pub source_name: Option<String>,
    pub chunk_index: i64,
}

/// A single retrieval result, in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Internal entry id (insertion ordinal).
    pub id: u64,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMeta>,
}
