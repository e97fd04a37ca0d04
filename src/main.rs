//! # semidex CLI (`sdx`)
//!
//! The `sdx` binary drives the ingestion pipeline and the retrieval query
//! path from the command line.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the SQLite index database and provision the schema |
//! | `sdx ingest <path>...` | Ingest files or directories into the index |
//! | `sdx query "<question>"` | Retrieve the most relevant passages |
//! | `sdx status <identity>` | Show a document's indexing state |
//!
//! ## Examples
//!
//! ```bash
//! sdx init --config ./config/sdx.toml
//! sdx ingest ./docs --config ./config/sdx.toml
//! sdx query "how do we rotate credentials?" --k 3
//! sdx status ./docs/runbook.pdf
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use semidex::config;
use semidex::embedding::{create_embedder, Embedder};
use semidex::index::{SqliteIndex, VectorIndex};
use semidex::ingest;
use semidex::models::{DocumentStatus, IngestOutcome};
use semidex::query;

/// semidex, a self-hosted document ingestion and semantic retrieval
/// pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sdx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "semidex: document ingestion and semantic passage retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and provisions the documents and records
    /// tables. Idempotent; running it multiple times is safe.
    Init,

    /// Ingest documents into the index.
    ///
    /// Each path is a file or a directory walked recursively. Every file
    /// becomes one document keyed by its path; re-ingesting a path
    /// supersedes the previous version.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a question and print the top-ranked passages.
    Query {
        /// The question to answer.
        question: String,

        /// Number of passages to return (defaults to retrieval.top_k_default).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show the indexing state of one document.
    Status {
        /// Document identity (the path it was ingested under).
        identity: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::open(&cfg.index.path).await?;
            index.provision().await?;
            index.close().await;
            println!("Index initialized successfully.");
        }

        Commands::Ingest { paths } => {
            let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&cfg.embedding)?);
            let index = Arc::new(SqliteIndex::open(&cfg.index.path).await?);

            let mut indexed = 0usize;
            let mut partial = 0usize;
            let mut empty = 0usize;

            for path in &paths {
                for event in ingest::collect_events(path)? {
                    let identity = event.identity.clone();
                    let outcome = ingest::ingest_document(
                        event,
                        &cfg.chunking,
                        &cfg.ingest,
                        embedder.clone(),
                        index.clone(),
                    )
                    .await?;

                    match outcome {
                        IngestOutcome::Indexed { segments } => {
                            indexed += 1;
                            println!("  {identity}: indexed ({segments} segments)");
                        }
                        IngestOutcome::Partial {
                            indexed: ok,
                            failed,
                        } => {
                            partial += 1;
                            println!(
                                "  {identity}: partial ({ok} indexed, {} failed)",
                                failed.len()
                            );
                        }
                        IngestOutcome::Empty => {
                            empty += 1;
                            println!("  {identity}: no extractable text, skipped");
                        }
                    }
                }
            }

            println!("ingest");
            println!("  documents indexed: {indexed}");
            println!("  documents partial: {partial}");
            println!("  documents empty: {empty}");
            println!("ok");
        }

        Commands::Query { question, k } => {
            let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&cfg.embedding)?);
            let index = Arc::new(SqliteIndex::open(&cfg.index.path).await?);
            let k = k.unwrap_or(cfg.retrieval.top_k_default);
            if k < 1 {
                anyhow::bail!("--k must be >= 1");
            }

            let passages = query::retrieve(&question, k, embedder, index).await?;

            if passages.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, passage) in passages.iter().enumerate() {
                let date = chrono::DateTime::from_timestamp(passage.arrived_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{}. [{:.4}] {} #{}",
                    i + 1,
                    passage.score,
                    passage.document_identity,
                    passage.ordinal
                );
                println!("    arrived: {date}");
                println!("    passage: \"{}\"", passage.text.replace('\n', " ").trim());
                println!();
            }
        }

        Commands::Status { identity } => {
            let index = SqliteIndex::open(&cfg.index.path).await?;
            match index.document_status(&identity).await? {
                Some(DocumentStatus::Indexed { segments }) => {
                    println!("{identity}: indexed ({segments} segments)");
                }
                Some(DocumentStatus::Partial { indexed, expected }) => {
                    println!("{identity}: partial ({indexed} of {expected} segments indexed)");
                }
                Some(DocumentStatus::Empty) => {
                    println!("{identity}: empty (no extractable text)");
                }
                None => anyhow::bail!("document not found: {identity}"),
            }
        }
    }

    Ok(())
}
