//! Bounded-concurrency embedding of chunk texts.
//!
//! Batches go to `spawn_blocking` tasks gated by a semaphore with
//! `max_concurrency` permits, and are reassembled in input order. Identical
//! texts (by blake3 digest) are embedded once.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use vaultdb_core::traits::Embedder;
use vaultdb_core::EmbedKind;

#[derive(Debug, Clone, Copy)]
pub struct EmbedOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub show_progress: bool,
}

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Check an embedder's output for one batch: count, width and finiteness.
pub fn validate_vectors(vectors: &[Vec<f32>], expected: usize, dim: usize) -> Result<()> {
    ensure!(vectors.len() == expected, "embedder returned {} vectors for {expected} texts", vectors.len());
    for v in vectors {
        ensure!(v.len() == dim, "dim mismatch: got {} expected {dim}", v.len());
        ensure!(v.iter().all(|x| x.is_finite()), "embedder returned a non-finite component");
    }
    Ok(())
}

/// Embed `texts` as passages; output `i` is the vector of `texts[i]`.
pub async fn embed_passages(embedder: Arc<dyn Embedder>, texts: &[String], opts: EmbedOptions) -> Result<Vec<Vec<f32>>> {
    let mut slot_of: HashMap<blake3::Hash, usize> = HashMap::new();
    let mut unique: Vec<String> = Vec::new();
    let slots: Vec<usize> = texts
        .iter()
        .map(|t| {
            *slot_of.entry(blake3::hash(t.as_bytes())).or_insert_with(|| {
                unique.push(t.clone());
                unique.len() - 1
            })
        })
        .collect();
    info!(texts = texts.len(), unique = unique.len(), batch_size = opts.batch_size, "embedding passages");

    let dim = embedder.dim();
    let pb = progress_bar(unique.len(), opts.show_progress);
    let semaphore = Arc::new(Semaphore::new(opts.max_concurrency.max(1)));
    let mut handles = Vec::new();
    for batch in unique.chunks(opts.batch_size.max(1)) {
        let permit = semaphore.clone().acquire_owned().await?;
        let embedder = embedder.clone();
        let batch = batch.to_vec();
        let pb = pb.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let out = embedder.embed_batch(&batch, EmbedKind::Passage)?;
            validate_vectors(&out, batch.len(), dim)?;
            pb.inc(batch.len() as u64);
            Ok::<_, anyhow::Error>(out)
        }));
    }

    let mut vectors = Vec::with_capacity(unique.len());
    for handle in handles {
        let out = handle.await.map_err(|e| anyhow!("embedding task failed: {e}"))??;
        vectors.extend(out);
    }
    pb.finish_and_clear();
    debug!(vectors = vectors.len(), "embedding done");

    Ok(slots.into_iter().map(|i| vectors[i].clone()).collect())
}

/// Embed one query string off the async runtime.
pub async fn embed_query(embedder: Arc<dyn Embedder>, query: &str) -> Result<Vec<f32>> {
    let dim = embedder.dim();
    let text = vec![query.to_string()];
    let mut out = tokio::task::spawn_blocking(move || embedder.embed_batch(&text, EmbedKind::Query))
        .await
        .map_err(|e| anyhow!("query embedding task failed: {e}"))??;
    validate_vectors(&out, 1, dim)?;
    Ok(out.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn id(&self) -> &str {
            "counting"
        }
        fn dim(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn duplicates_are_embedded_once_and_order_is_kept() {
        let embedder = Arc::new(CountingEmbedder { calls: Default::default() });
        let texts: Vec<String> = ["a", "bbb", "a", "cc", "bbb"].iter().map(|s| s.to_string()).collect();
        let opts = EmbedOptions { batch_size: 1, max_concurrency: 2, show_progress: false };
        let out = embed_passages(embedder.clone(), &texts, opts).await.unwrap();
        let lens: Vec<f32> = out.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 3.0, 1.0, 2.0, 3.0]);
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn validation_catches_count_and_dim() {
        assert!(validate_vectors(&[vec![0.0; 3]], 2, 3).is_err());
        assert!(validate_vectors(&[vec![0.0; 4]], 1, 3).is_err());
        assert!(validate_vectors(&[vec![f32::NAN; 3]], 1, 3).is_err());
        assert!(validate_vectors(&[vec![0.0; 3]], 1, 3).is_ok());
    }
}
