//! # pdf-chat
//!
//! Ask questions about your documents. An uploaded document is split into
//! overlapping chunks, embedded, and stored in a cosine-similarity vector
//! index persisted to one JSON snapshot. Questions are embedded the same
//! way, the nearest chunks are placed into a grounded prompt, and a hosted
//! or local LLM writes the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│  Embed   │──▶│ VectorIndex │──▶ snapshot.json
//! │ PDF/OOXML│   └─────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                       │ top-k
//!                                                    ▼
//!                     question ──▶ embed ──▶ search ──▶ prompt ──▶ Generator
//! ```
//!
//! The chunker, index, prompt composer and embedding trait live in
//! [`pdf_chat_core`]; this crate adds providers, extraction, the
//! orchestrator, and the CLI/HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | Document text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generators |
//! | [`retry`] | Backoff for remote providers |
//! | [`pipeline`] | Ingestion/query orchestration and the shared index |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod server;

pub use pdf_chat_core::{RagError, RagResult};
