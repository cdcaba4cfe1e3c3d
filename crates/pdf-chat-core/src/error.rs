//! Error taxonomy for the retrieval pipeline.
//!
//! Structural errors (configuration, extraction, dimension, format) are
//! deterministic: retrying the same input cannot succeed. Only
//! [`RagError::TransientService`] is eligible for retry.

use thiserror::Error;

pub type RagResult<T> = Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunk/overlap sizes, unknown provider, missing model settings.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The source document could not be turned into text.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Extraction succeeded but produced nothing to index.
    #[error("document produced no text to index")]
    EmptyDocument,

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Unreadable or incompatible index snapshot.
    #[error("invalid index snapshot: {0}")]
    Format(String),

    /// Backend unavailable (network error, 429, 5xx). Retryable.
    #[error("{service} unavailable: {message}")]
    TransientService {
        service: &'static str,
        message: String,
    },

    /// Backend rejected the request (4xx other than 429, malformed reply).
    #[error("{service} request failed: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn transient(service: &'static str, message: impl Into<String>) -> Self {
        RagError::TransientService {
            service,
            message: message.into(),
        }
    }

    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        RagError::Service {
            service,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::TransientService { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(RagError::transient("embedding", "503").is_transient());
        assert!(!RagError::service("embedding", "400").is_transient());
        assert!(!RagError::EmptyDocument.is_transient());
        assert!(!RagError::DimensionMismatch {
            expected: 384,
            found: 768
        }
        .is_transient());
    }

    #[test]
    fn dimension_mismatch_message_names_both_sizes() {
        let msg = RagError::DimensionMismatch {
            expected: 384,
            found: 1536,
        }
        .to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("1536"));
    }
}
