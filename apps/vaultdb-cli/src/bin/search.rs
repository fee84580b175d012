//! vaultdb-search: query the active generation from the command line.
//!
//! ```bash
//! vaultdb-search "examples of bandits in industry" -k 5
//! vaultdb-search "retrieval augmented" --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use vaultdb_cli::{init_tracing, load_settings};
use vaultdb_embed::get_default_embedder;
use vaultdb_hybrid::{IndexStore, RetrievalService};
use vaultdb_text::EnglishAnalyzer;

#[derive(Parser)]
#[command(name = "vaultdb-search", version, about = "Hybrid keyword + semantic search over a built vault index")]
struct Cli {
    /// Search query
    query: String,

    /// Number of results (default: search.default_k)
    #[arg(short, long)]
    k: Option<usize>,

    /// Index root (default: data.index_dir)
    #[arg(long)]
    index: Option<PathBuf>,

    /// Stop adding results once this many estimated tokens are collected
    #[arg(long)]
    max_context_tokens: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    #[arg(long, env = "VAULTDB_CONFIG_DIR")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if cli.max_context_tokens.is_some() {
        settings.search.max_context_tokens = cli.max_context_tokens;
    }
    let index = cli.index.unwrap_or_else(|| PathBuf::from(&settings.data.index_dir));
    let k = cli.k.unwrap_or(settings.search.default_k);

    let embedder = get_default_embedder(&settings.embedding)?;
    let store = IndexStore::open(&index)?;
    let service = RetrievalService::open(store, embedder, Arc::new(EnglishAnalyzer::new()), settings.search).await?;
    let results = service.search(&cli.query, k).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("no results for {:?}", cli.query);
    }
    for (i, r) in results.iter().enumerate() {
        let ranks = match (r.keyword_rank, r.semantic_rank) {
            (Some(a), Some(b)) => format!("kw #{a}, sem #{b}"),
            (Some(a), None) => format!("kw #{a}"),
            (None, Some(b)) => format!("sem #{b}"),
            (None, None) => String::new(),
        };
        println!("{}. {} ({}) [{:.4}; {}]", i + 1, r.title, r.path, r.score, ranks);
        println!("   {}", r.chunk.replace('\n', "\n   "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "search failed");
        return Err(e);
    }
    Ok(())
}
