//! HTTP API over the pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload-pdf` | Multipart upload (field `file`); replaces the shared index |
//! | `POST` | `/chat` | `{ "message", "k"? }` → answer grounded in the shared index |
//! | `POST` | `/ask-question` | `{ "text", "question", "k"? }` → answer over the given text only |
//! | `GET`  | `/index` | Current index status |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `configuration` | 400 |
//! | `invalid_document` | 400 |
//! | `empty_document` | 422 |
//! | `payload_too_large` | 413 |
//! | `upstream_error` | 502 |
//! | `service_unavailable` | 503 |
//! | `index_error`, `internal` | 500 |
//!
//! CORS is fully permissive so browser front-ends on other origins can call
//! the API directly.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use pdf_chat_core::models::SearchHit;
use pdf_chat_core::RagError;

use crate::config::Config;
use crate::extract::resolve_content_type;
use crate::pipeline::{Document, IndexStatus, Pipeline, QueryAnswer};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Build the pipeline from `config` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    let app = router(pipeline, upload_limit_bytes(config.server.max_upload_mb));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "pdf-chat server listening");
    println!("pdf-chat server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Request body limit for `max_upload_mb`, clamped to `usize::MAX`.
fn upload_limit_bytes(max_upload_mb: usize) -> usize {
    max_upload_mb.saturating_mul(1024 * 1024)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Routes, CORS and body limit around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload-pdf", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/ask-question", post(handle_ask))
        .route("/index", get(handle_index_status))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration"),
            RagError::Extraction(_) => (StatusCode::BAD_REQUEST, "invalid_document"),
            RagError::EmptyDocument => (StatusCode::UNPROCESSABLE_ENTITY, "empty_document"),
            RagError::DimensionMismatch { .. } | RagError::Format(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "index_error")
            }
            RagError::TransientService { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            RagError::Service { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            RagError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError::new(status, code, message)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "bad_request"
        };
        AppError::new(status, code, err.body_text())
    }
}

// ============ POST /upload-pdf ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    chunk_count: usize,
    document_id: String,
    version: u64,
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some((file_name, content_type, bytes));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| bad_request("No file part"))?;
    let file_name = file_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| bad_request("No selected file"))?;
    if bytes.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }
    let content_type = resolve_content_type(content_type.as_deref(), Some(&file_name))
        .ok_or_else(|| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                "invalid_document",
                format!("unsupported document type: {}", file_name),
            )
        })?;

    let report = state
        .pipeline
        .ingest(Document::new(Some(file_name), content_type, bytes.to_vec()))
        .await?;

    Ok(Json(UploadResponse {
        message: "Document processed and indexed successfully".to_string(),
        chunk_count: report.chunk_count,
        document_id: report.document_id,
        version: report.version,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    grounded: bool,
    sources: Vec<SearchHit>,
}

impl From<QueryAnswer> for ChatResponse {
    fn from(answer: QueryAnswer) -> Self {
        Self {
            response: answer.answer,
            grounded: answer.grounded,
            sources: answer.sources,
        }
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let message = required(req.message, "message")?;
    let answer = state.pipeline.query(&message, req.k).await?;
    Ok(Json(answer.into()))
}

// ============ POST /ask-question ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let text = required(req.text, "text")?;
    let question = required(req.question, "question")?;
    let answer = state.pipeline.ask(&text, &question, req.k).await?;
    Ok(Json(answer.into()))
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(bad_request(format!("{} must not be empty", field))),
    }
}

// ============ GET /index ============

async fn handle_index_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.pipeline.status())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index_ready: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index_ready: state.pipeline.index().current().is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RagError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (RagError::Extraction("x".into()), StatusCode::BAD_REQUEST),
            (RagError::EmptyDocument, StatusCode::UNPROCESSABLE_ENTITY),
            (
                RagError::DimensionMismatch {
                    expected: 3,
                    found: 4,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RagError::transient("embedding", "503"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (RagError::service("generation", "400"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_upload_limit_saturates() {
        assert_eq!(upload_limit_bytes(32), 32 * 1024 * 1024);
        assert_eq!(upload_limit_bytes(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(required(Some("  ".into()), "message").is_err());
        assert!(required(None, "message").is_err());
        assert_eq!(required(Some("hi".into()), "message").unwrap(), "hi");
    }
}
