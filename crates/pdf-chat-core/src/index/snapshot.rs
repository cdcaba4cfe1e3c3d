//! On-disk snapshots of a [`VectorIndex`].
//!
//! A snapshot is a single JSON document holding the model name, the
//! dimensionality, the metric, and every entry. Vectors are stored as
//! base64-encoded little-endian `f32` bytes (see
//! [`vec_to_blob`](crate::embedding::vec_to_blob)), which keeps the file
//! compact and lossless.
//!
//! Writes go to a temporary file in the target directory and are renamed
//! over the destination, so a reader never sees a half-written snapshot and
//! a failed write leaves the previous snapshot intact.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IndexEntry, VectorIndex, METRIC_COSINE};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, RagResult};
use crate::models::DocumentMeta;

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    model: String,
    dims: usize,
    metric: String,
    created_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    id: u64,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<DocumentMeta>,
    vector: String,
}

impl VectorIndex {
    /// Write the full index to `path`, replacing any existing snapshot.
    ///
    /// Parent directories are created as needed.
    pub fn persist(&self, path: &Path) -> RagResult<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let file = SnapshotFile {
            format_version: SNAPSHOT_FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            metric: METRIC_COSINE.to_string(),
            created_at: self.created_at,
            entries: self
                .entries
                .iter()
                .map(|e| SnapshotEntry {
                    id: e.id,
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                    vector: STANDARD.encode(vec_to_blob(&e.vector)),
                })
                .collect(),
        };

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &file)
                .map_err(|e| RagError::Format(format!("failed to serialize snapshot: {}", e)))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| RagError::Io(e.error))?;
        Ok(())
    }

    /// Load a snapshot written by [`persist`](VectorIndex::persist).
    ///
    /// Returns `Ok(None)` when no snapshot exists at `path`.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the stored dimensionality differs
    ///   from `expected_dims` (the configured embedder's output size).
    /// - [`RagError::Format`] for unparseable files, unknown versions, a
    ///   different metric, or vectors of the wrong length.
    pub fn load(path: &Path, expected_dims: usize) -> RagResult<Option<VectorIndex>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SnapshotFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RagError::Format(format!("{}: {}", path.display(), e)))?;

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RagError::Format(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if snapshot.metric != METRIC_COSINE {
            return Err(RagError::Format(format!(
                "unsupported similarity metric '{}'",
                snapshot.metric
            )));
        }
        if snapshot.dims != expected_dims {
            return Err(RagError::DimensionMismatch {
                expected: expected_dims,
                found: snapshot.dims,
            });
        }

        let mut entries = Vec::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            let bytes = STANDARD
                .decode(entry.vector.as_bytes())
                .map_err(|e| RagError::Format(format!("entry {}: {}", entry.id, e)))?;
            if bytes.len() != snapshot.dims * 4 {
                return Err(RagError::Format(format!(
                    "entry {} has {} bytes, expected {}",
                    entry.id,
                    bytes.len(),
                    snapshot.dims * 4
                )));
            }
            entries.push(IndexEntry {
                id: entry.id,
                vector: blob_to_vec(&bytes),
                text: entry.text,
                metadata: entry.metadata,
            });
        }

        let next_id = entries.iter().map(|e| e.id + 1).max().unwrap_or(0);
        Ok(Some(VectorIndex {
            model: snapshot.model,
            dims: snapshot.dims,
            entries,
            next_id,
            created_at: snapshot.created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build() -> VectorIndex {
        let mut index = VectorIndex::new("mini", 3).unwrap();
        index.insert(vec![0.2, 0.1, 0.9], "alpha").unwrap();
        index
            .insert_with_metadata(
                vec![0.8, 0.3, 0.1],
                "beta",
                Some(DocumentMeta {
                    document_id: "doc".to_string(),
                    source_name: Some("b.pdf".to_string()),
                    chunk_index: 1,
                }),
            )
            .unwrap();
        index.insert(vec![0.4, 0.4, 0.4], "gamma").unwrap();
        index.insert(vec![0.4, 0.4, 0.4], "gamma").unwrap();
        index
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let tmp = TempDir::new().unwrap();
        let loaded = VectorIndex::load(&tmp.path().join("absent.json"), 3).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_persist_load_preserves_search_results() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.json");
        let index = build();
        index.persist(&path).unwrap();

        let loaded = VectorIndex::load(&path, 3).unwrap().unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.model(), "mini");
        assert_eq!(loaded.entries(), index.entries());

        for query in [[0.4f32, 0.4, 0.4], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]] {
            let before: Vec<(u64, String)> = index
                .search(&query, 4)
                .unwrap()
                .into_iter()
                .map(|h| (h.id, h.text))
                .collect();
            let after: Vec<(u64, String)> = loaded
                .search(&query, 4)
                .unwrap()
                .into_iter()
                .map(|h| (h.id, h.text))
                .collect();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_ids_continue_after_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        build().persist(&path).unwrap();
        let mut loaded = VectorIndex::load(&path, 3).unwrap().unwrap();
        assert_eq!(loaded.insert(vec![1.0, 0.0, 0.0], "delta").unwrap(), 4);
    }

    #[test]
    fn test_dimension_mismatch_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        build().persist(&path).unwrap();
        let err = VectorIndex::load(&path, 384).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 384,
                found: 3
            }
        ));
    }

    #[test]
    fn test_corrupt_snapshot_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            VectorIndex::load(&path, 3),
            Err(RagError::Format(_))
        ));
    }

    #[test]
    fn test_wrong_metric_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        build().persist(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"cosine\"", "\"l2\"")).unwrap();
        assert!(matches!(
            VectorIndex::load(&path, 3),
            Err(RagError::Format(_))
        ));
    }

    #[test]
    fn test_persist_overwrites_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        build().persist(&path).unwrap();

        let mut small = VectorIndex::new("mini", 3).unwrap();
        small.insert(vec![0.0, 1.0, 0.0], "only").unwrap();
        small.persist(&path).unwrap();

        let loaded = VectorIndex::load(&path, 3).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].text, "only");
    }
}
