//! # pdf-rag CLI
//!
//! Runs the HTTP service and exposes the same operations for local use.
//!
//! ## Usage
//!
//! ```bash
//! pdf-rag --config ./config/pdf-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdf-rag serve` | Start the HTTP API |
//! | `pdf-rag upload <file.pdf>` | Ingest a PDF into the catalog and index |
//! | `pdf-rag ask "<question>"` | Answer a question (add `--no-rag` to skip retrieval) |
//! | `pdf-rag documents` | List ingested documents |
//! | `pdf-rag clear --yes` | Remove every document and indexed chunk |
//! | `pdf-rag check` | Verify the chat backend and print store sizes |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pdf_rag::app::App;
use pdf_rag::config::{load_or_default, Config};
use pdf_rag::logging::init_logging;
use pdf_rag::server::run_server;

const DEFAULT_CONFIG_PATH: &str = "./config/pdf-rag.toml";

/// Upload PDFs and ask questions answered from their content.
#[derive(Parser)]
#[command(name = "pdf-rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdf-rag.toml`; built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a PDF file.
    Upload {
        /// Path to the PDF.
        path: PathBuf,
    },

    /// Ask a question about the uploaded documents.
    Ask {
        query: String,

        /// Answer directly from the model without consulting documents.
        #[arg(long)]
        no_rag: bool,
    },

    /// List ingested documents.
    Documents,

    /// Remove all documents and indexed chunks.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Check that the chat backend is reachable and report store sizes.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (path, allow_missing) = match cli.config {
        Some(path) => (path, false),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), true),
    };
    let cfg = load_or_default(&path, allow_missing)?;
    init_logging(&cfg.logging)?;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using built-in defaults");
    }

    match cli.command {
        Commands::Serve => run_server(cfg).await?,
        Commands::Upload { path } => upload(cfg, path).await?,
        Commands::Ask { query, no_rag } => {
            let app = App::build(cfg).await?;
            let response = app.ask(&query, !no_rag).await?;
            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!("\nSources: {}", response.sources.join(", "));
            }
            if !response.success {
                std::process::exit(1);
            }
        }
        Commands::Documents => {
            let app = App::build(cfg).await?;
            let documents = app.documents().await;
            if documents.is_empty() {
                println!("No documents uploaded.");
            }
            for doc in documents {
                println!(
                    "{}  {:<40} {:>10} bytes  {:>5} chunks  {}",
                    doc.id,
                    doc.filename,
                    doc.size_bytes,
                    doc.chunk_count,
                    doc.upload_time.to_rfc3339()
                );
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to clear all documents without --yes");
            }
            let app = App::build(cfg).await?;
            let removed = app.clear_all().await?;
            println!("Cleared {} documents.", removed);
        }
        Commands::Check => {
            let app = App::build(cfg).await?;
            let model = app.chat_model();
            model
                .ping()
                .await
                .with_context(|| format!("chat backend for '{}' is unreachable", model.model_name()))?;
            let health = app.health().await?;
            println!("Chat model:  {} (reachable)", model.model_name());
            println!("Documents:   {}", health.documents);
            println!("Chunks:      {}", health.chunks);
        }
    }

    Ok(())
}

async fn upload(cfg: Config, path: PathBuf) -> anyhow::Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let app = App::build(cfg).await?;
    let record = app.ingest_pdf(&filename, &bytes).await?;
    println!(
        "Uploaded {} as {} ({} chunks)",
        record.filename, record.id, record.chunk_count
    );
    Ok(())
}
