//! # pdf-chat CLI (`pdfchat`)
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat serve` | Start the HTTP API |
//! | `pdfchat ingest <file>` | Index a document, replacing the current index |
//! | `pdfchat query "<question>"` | Answer a question from the index |
//! | `pdfchat status` | Show the current index |
//!
//! ## Examples
//!
//! ```bash
//! pdfchat ingest ./handbook.pdf
//! pdfchat query "What is the refund policy?" --k 5
//! pdfchat query "What is the refund policy?" --no-generate
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use pdf_chat::{commands, config, logging, server};

/// Chat with your documents.
///
/// All commands accept `--config`. See `config/pdfchat.example.toml`.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Chat with your documents: index a PDF, then ask questions grounded in it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdfchat.toml`. Built-in defaults are used when
    /// the default file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Index a document (PDF, DOCX, PPTX, XLSX, TXT, MD, CSV).
    ///
    /// The new index replaces the previous one once it has been written to
    /// disk; a failed ingestion leaves the previous index in place.
    Ingest {
        /// Path to the document.
        file: PathBuf,
    },

    /// Ask a question against the current index.
    Query {
        question: String,

        /// Number of context chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print the retrieved context and prompt instead of calling the generator.
        #[arg(long)]
        no_generate: bool,
    },

    /// Show index status.
    Status,
}

const DEFAULT_CONFIG: &str = "./config/pdfchat.toml";

fn load_config(path: &Path) -> anyhow::Result<config::Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(config::Config::minimal());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { file } => {
            commands::run_ingest(&cfg, &file).await?;
        }
        Commands::Query {
            question,
            k,
            no_generate,
        } => {
            commands::run_query(&cfg, &question, k, !no_generate).await?;
        }
        Commands::Status => {
            commands::run_status(&cfg).await?;
        }
    }

    Ok(())
}
