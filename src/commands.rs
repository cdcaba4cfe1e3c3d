//! CLI command implementations for `pdfchat ingest | query | status`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::{create_generator, DisabledGenerator, Generator};
use crate::pipeline::{Document, IndexStatus, Pipeline, PipelineSettings};

/// Open the pipeline; commands that never generate skip provider setup
/// (and its API key requirement) for the generator.
async fn open_pipeline(cfg: &Config, generate: bool) -> Result<Pipeline> {
    let settings = PipelineSettings::from_config(cfg)?;
    let embedder = create_provider(&cfg.embedding)?;
    let generator: Arc<dyn Generator> = if generate {
        create_generator(&cfg.generation)?
    } else {
        Arc::new(DisabledGenerator)
    };
    Pipeline::open(settings, embedder, generator)
        .await
        .with_context(|| format!("Failed to open index at {}", cfg.index.path.display()))
}

pub async fn run_ingest(cfg: &Config, path: &Path) -> Result<()> {
    let document = Document::from_path(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let pipeline = open_pipeline(cfg, false).await?;
    let report = pipeline.ingest(document).await?;

    println!("Ingested {}", path.display());
    println!("  document id: {}", report.document_id);
    println!("  chunks:      {}", report.chunk_count);
    println!("  version:     {}", report.version);
    println!("  index:       {}", cfg.index.path.display());
    Ok(())
}

pub async fn run_query(
    cfg: &Config,
    question: &str,
    k: Option<usize>,
    generate: bool,
) -> Result<()> {
    let pipeline = open_pipeline(cfg, generate).await?;

    if !generate {
        let context = pipeline.prepare(question, k).await?;
        if context.hits.is_empty() {
            println!("No indexed context; the question would be sent as-is.");
        }
        for (i, hit) in context.hits.iter().enumerate() {
            println!("{}. [{:.4}] {}", i + 1, hit.score, source_label(hit));
            println!("   {}", preview(&hit.text, 200));
        }
        println!();
        println!("--- prompt ---");
        println!("{}", context.prompt);
        return Ok(());
    }

    let answer = pipeline.query(question, k).await?;
    println!("{}", answer.answer.trim_end());
    if answer.grounded {
        println!();
        println!("Sources:");
        for (i, hit) in answer.sources.iter().enumerate() {
            println!("  {}. [{:.4}] {}", i + 1, hit.score, source_label(hit));
        }
    }
    Ok(())
}

pub async fn run_status(cfg: &Config) -> Result<()> {
    let pipeline = open_pipeline(cfg, false).await?;
    match pipeline.status() {
        IndexStatus::Empty => {
            println!("No index at {}", cfg.index.path.display());
        }
        IndexStatus::Ready {
            version,
            entries,
            dims,
            model,
            created_at,
        } => {
            println!("Index: {}", cfg.index.path.display());
            println!("  version: {}", version);
            println!("  entries: {}", entries);
            println!("  model:   {} ({} dims)", model, dims);
            println!("  built:   {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    Ok(())
}

fn source_label(hit: &pdf_chat_core::models::SearchHit) -> String {
    match &hit.metadata {
        Some(meta) => format!(
            "{} #{}",
            meta.source_name.as_deref().unwrap_or(&meta.document_id),
            meta.chunk_index
        ),
        None => format!("entry {}", hit.id),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
