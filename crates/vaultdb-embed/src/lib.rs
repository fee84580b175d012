//! vaultdb-embed
//!
//! Embedding providers: a candle BERT encoder for real models and a
//! feature-hashing embedder that needs no model files.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use vaultdb_core::settings::{EmbeddingProvider, EmbeddingSettings};
use vaultdb_core::traits::Embedder;

pub mod bert;
pub mod device;
pub mod hash;
pub mod pool;
pub mod testing;
pub mod tokenize;

pub use bert::BertEmbedder;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

/// Build the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hash provider regardless of settings.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || settings.provider == EmbeddingProvider::Hash {
        info!(dim = settings.dim, forced = use_fake, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let dir = bert::resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(BertEmbedder::load(&dir, settings.max_len)?))
}
