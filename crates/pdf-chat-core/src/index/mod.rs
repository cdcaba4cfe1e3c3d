//! Flat in-memory vector index.
//!
//! [`VectorIndex`] stores `(vector, chunk text, metadata)` entries in
//! insertion order and answers top-k queries by brute-force cosine
//! similarity. Vectors are L2-normalized on insert, so a search is a dot
//! product against every entry; the metric is fixed to cosine and recorded
//! in snapshots (see [`snapshot`]).
//!
//! The index itself is a plain value with no interior locking. Sharing it
//! between concurrent readers and a writer is the caller's job: build a new
//! index in isolation, then publish it behind an `Arc` swap.
//!
//! # Example
//!
//! ```rust
//! use pdf_chat_core::index::VectorIndex;
//!
//! let mut index = VectorIndex::new("test-model", 2).unwrap();
//! index.insert(vec![1.0, 0.0], "east").unwrap();
//! index.insert(vec![0.0, 1.0], "north").unwrap();
//!
//! let hits = index.search(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(hits[0].text, "east");
//! ```

pub mod snapshot;

use chrono::{DateTime, Utc};

use crate::embedding::normalize;
use crate::error::{RagError, RagResult};
use crate::models::{Chunk, DocumentMeta, SearchHit};

/// The only supported similarity metric.
pub const METRIC_COSINE: &str = "cosine";

/// One stored vector with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Insertion ordinal, unique within one index.
    pub id: u64,
    /// Unit-length embedding.
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Option<DocumentMeta>,
}

/// Brute-force cosine-similarity index over a single embedding space.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
    next_id: u64,
    created_at: DateTime<Utc>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dims` entries produced by `model`.
    pub fn new(model: impl Into<String>, dims: usize) -> RagResult<Self> {
        if dims == 0 {
            return Err(RagError::Configuration(
                "index dimensionality must be > 0".to_string(),
            ));
        }
        Ok(Self {
            model: model.into(),
            dims,
            entries: Vec::new(),
            next_id: 0,
            created_at: Utc::now(),
        })
    }

    /// Build an index from chunks and their embeddings (same order).
    pub fn from_chunks(
        model: impl Into<String>,
        dims: usize,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
        source_name: Option<&str>,
    ) -> RagResult<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::service(
                "embedding",
                format!(
                    "expected {} vectors, received {}",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }
        let mut index = Self::new(model, dims)?;
        index.entries.reserve(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let metadata = DocumentMeta {
                document_id: chunk.document_id.clone(),
                source_name: source_name.map(str::to_string),
                chunk_index: chunk.chunk_index,
            };
            index.insert_with_metadata(vector, chunk.text.clone(), Some(metadata))?;
        }
        Ok(index)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append one entry without metadata. Returns its id.
    pub fn insert(&mut self, vector: Vec<f32>, text: impl Into<String>) -> RagResult<u64> {
        self.insert_with_metadata(vector, text, None)
    }

    /// Append one entry. Duplicate texts and vectors are allowed.
    pub fn insert_with_metadata(
        &mut self,
        mut vector: Vec<f32>,
        text: impl Into<String>,
        metadata: Option<DocumentMeta>,
    ) -> RagResult<u64> {
        self.check_dims(vector.len())?;
        normalize(&mut vector);
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(IndexEntry {
            id,
            vector,
            text: text.into(),
            metadata,
        });
        Ok(id)
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. `k` is clamped to the index size;
    /// an empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<SearchHit>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dims(query.len())?;

        let mut q = query.to_vec();
        normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, dot(&q, &e.vector)))
            .collect();
        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let e = &self.entries[i];
                SearchHit {
                    id: e.id,
                    score,
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                }
            })
            .collect())
    }

    fn check_dims(&self, found: usize) -> RagResult<()> {
        if found != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                found,
            });
        }
        Ok(())
    }
}

/// Cosine similarity of two vectors already scaled to unit length.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
