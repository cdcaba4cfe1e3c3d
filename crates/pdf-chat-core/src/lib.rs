//! # pdf-chat core
//!
//! Runtime-agnostic logic for the document chat pipeline: data models,
//! overlapping chunker, in-memory vector index with snapshot persistence,
//! prompt composition, and the embedding trait.
//!
//! This crate contains no tokio, HTTP, or provider-specific code. The
//! application crate (`pdf-chat`) wires these pieces to concrete embedding
//! and generation backends and owns the shared index handle.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;

pub use error::{RagError, RagResult};
