//! # mnemo CLI
//!
//! ```bash
//! mnemo serve                     # start the HTTP server + watcher
//! mnemo ingest ~/notes            # index a file or directory
//! mnemo search "deployment runbook" --k 5
//! mnemo stats                     # embedder and tracker statistics
//! ```
//!
//! All commands accept `--config <path>` pointing to a YAML file with
//! `watch_paths`, `http_port`, and `data_dir`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mnemo::config;
use mnemo::indexer::{Indexer, IngestOutcome};
use mnemo::search::{search_chunks, SearchRequest};
use mnemo::server;
use mnemo::watcher::Watcher;

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "Personal knowledge-indexing engine",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "./config/mnemo.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the filesystem watcher.
    Serve,

    /// Index a file or directory.
    Ingest {
        /// File or directory to index.
        path: PathBuf,
    },

    /// Search indexed chunks.
    Search {
        /// The query string.
        query: String,

        /// Number of results.
        #[arg(long, default_value_t = 10)]
        k: usize,
    },

    /// Print embedder and tracker statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mnemo=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    cfg.ensure_data_dir()?;

    let synonyms = cli.config.parent().map(|d| d.join("synonyms.json"));
    let indexer = Arc::new(Indexer::open(&cfg.data_dir, synonyms.as_deref())?);

    match cli.command {
        Commands::Serve => {
            let watcher = Watcher::new(cfg.watch_paths.clone(), Arc::clone(&indexer))?;
            tokio::spawn(watcher.run());

            server::run_server(&cfg, Some(indexer)).await?;
        }
        Commands::Ingest { path } => {
            let mut indexed = 0usize;
            let mut unchanged = 0usize;
            let mut failed = 0usize;

            let files: Vec<PathBuf> = if path.is_dir() {
                walkdir::WalkDir::new(&path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .collect()
            } else {
                vec![path]
            };

            for file in files {
                match indexer.ingest_file(&file) {
                    Ok(IngestOutcome::Indexed { chunk_count, .. }) => {
                        indexed += 1;
                        println!("indexed {} ({chunk_count} chunks)", file.display());
                    }
                    Ok(IngestOutcome::Unchanged) => unchanged += 1,
                    Err(e) => {
                        failed += 1;
                        eprintln!("failed {}: {e}", file.display());
                    }
                }
            }

            println!("done: {indexed} indexed, {unchanged} unchanged, {failed} failed");
        }
        Commands::Search { query, k } => {
            let request = SearchRequest {
                query,
                k: k.clamp(1, 100),
                offset: 0,
                type_filter: None,
                path_filter: None,
            };
            let page = search_chunks(indexer.embedder(), indexer.vectors(), &request)?;

            if page.results.is_empty() {
                println!("No results.");
            }
            for (i, hit) in page.results.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.id);
                println!("    {}", hit.meta);
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&indexer.stats())?);
        }
    }

    Ok(())
}
