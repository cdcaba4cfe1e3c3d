//! Fixed-size sliding-window text chunker.
//!
//! Splits document text into [`Chunk`]s of a target length with a fixed
//! overlap between neighbours, so that context spanning a chunk boundary is
//! still retrievable from at least one chunk.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text.
//!
//! # Algorithm
//!
//! 1. Measure the text in the configured [`ChunkUnit`] (Unicode scalar
//!    values, or whitespace-separated words).
//! 2. With `stride = size - overlap`, chunk *i* spans
//!    `[i × stride, min(i × stride + size, len))`.
//! 3. Stop at the first chunk whose end reaches `len`.
//!
//! Consecutive chunks therefore share exactly `overlap` units, and the
//! sequence covers the input with no gaps. Empty input yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use pdf_chat_core::chunk::{ChunkUnit, Chunker};
//!
//! let chunker = Chunker::new(10, 4, ChunkUnit::Chars).unwrap();
//! let chunks = chunker.chunk("doc-1", "abcdefghijklmnop");
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "abcdefghij");
//! assert_eq!(chunks[1].text, "ghijklmnop");
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, RagResult};
use crate::models::Chunk;

/// Default target chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Unit in which chunk size and overlap are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values. Chunk text is an exact slice of the input.
    #[default]
    Chars,
    /// Whitespace-separated words, re-joined with a single space.
    Words,
}

/// Sliding-window chunker with validated size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            unit: ChunkUnit::Chars,
        }
    }
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] if `size == 0` or `overlap >= size`; such
    /// a window would never advance.
    pub fn new(size: usize, overlap: usize, unit: ChunkUnit) -> RagResult<Self> {
        if size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be > 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self {
            size,
            overlap,
            unit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn unit(&self) -> ChunkUnit {
        self.unit
    }

    /// Split `text` into chunks with contiguous indices starting at 0.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        match self.unit {
            ChunkUnit::Chars => {
                // Byte offset of every char boundary, including the end.
                let bounds: Vec<usize> = text
                    .char_indices()
                    .map(|(i, _)| i)
                    .chain(std::iter::once(text.len()))
                    .collect();
                let len = bounds.len() - 1;
                self.spans(len)
                    .into_iter()
                    .enumerate()
                    .map(|(i, (s, e))| {
                        make_chunk(document_id, i as i64, &text[bounds[s]..bounds[e]], s, e)
                    })
                    .collect()
            }
            ChunkUnit::Words => {
                let words: Vec<&str> = text.split_whitespace().collect();
                self.spans(words.len())
                    .into_iter()
                    .enumerate()
                    .map(|(i, (s, e))| {
                        make_chunk(document_id, i as i64, &words[s..e].join(" "), s, e)
                    })
                    .collect()
            }
        }
    }

    /// Window boundaries over a sequence of `len` units.
    fn spans(&self, len: usize) -> Vec<(usize, usize)> {
        let stride = self.size - self.overlap;
        let mut spans = Vec::with_capacity(len / stride + 1);
        let mut start = 0;
        while start < len {
            let end = (start + self.size).min(len);
            spans.push((start, end));
            if end == len {
                break;
            }
            start += stride;
        }
        spans
    }
}

/// Chunk `text` by characters with the given size and overlap.
///
/// Convenience wrapper around [`Chunker`] for one-off calls.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    size: usize,
    overlap: usize,
) -> RagResult<Vec<Chunk>> {
    Ok(Chunker::new(size, overlap, ChunkUnit::Chars)?.chunk(document_id, text))
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        start,
        end,
    }
}
