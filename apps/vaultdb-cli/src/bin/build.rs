//! vaultdb-build: rebuild both indices from a vault and publish a new generation.
//!
//! ```bash
//! vaultdb-build --vault ~/notes --index ./index --max-chars 1200
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use vaultdb_cli::{init_tracing, load_settings};
use vaultdb_embed::get_default_embedder;
use vaultdb_hybrid::{IndexBuilder, IndexStore};
use vaultdb_text::EnglishAnalyzer;

#[derive(Parser)]
#[command(name = "vaultdb-build", version, about = "Build keyword and semantic indices for a note vault")]
struct Cli {
    /// Vault directory (default: data.vault_dir)
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Index root (default: data.index_dir)
    #[arg(long)]
    index: Option<PathBuf>,

    #[arg(long)]
    max_chars: Option<usize>,

    #[arg(long)]
    overlap_chars: Option<usize>,

    #[arg(long)]
    min_chars: Option<usize>,

    /// Directory holding config.toml
    #[arg(long, env = "VAULTDB_CONFIG_DIR")]
    config: Option<PathBuf>,

    /// Hide the embedding progress bar
    #[arg(long)]
    no_progress: bool,

    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(n) = cli.max_chars {
        settings.chunking.max_chars = n;
    }
    if let Some(n) = cli.overlap_chars {
        settings.chunking.overlap_chars = n;
    }
    if let Some(n) = cli.min_chars {
        settings.chunking.min_chars = n;
    }
    settings.validate()?;

    let vault = cli.vault.unwrap_or_else(|| PathBuf::from(&settings.data.vault_dir));
    let index = cli.index.unwrap_or_else(|| PathBuf::from(&settings.data.index_dir));
    let embedder = get_default_embedder(&settings.embedding)?;
    let store = IndexStore::open(&index)?;

    let builder = IndexBuilder::new(settings, embedder, Arc::new(EnglishAnalyzer::new())).with_progress(!cli.no_progress);
    let report = builder.build_from_vault(&vault, &store).await?;

    println!("generation {} published", report.generation);
    println!("  notes:  {}", report.notes);
    println!("  chunks: {}", report.chunks);
    if report.ann {
        println!("  ann:    IVF_PQ");
    }
    if !report.pruned.is_empty() {
        println!("  pruned: {}", report.pruned.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "build failed");
        return Err(e);
    }
    Ok(())
}
