//! Embedders with scripted behavior, for exercising the pipeline and the
//! retrieval service without a model.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;

use vaultdb_core::traits::Embedder;
use vaultdb_core::EmbedKind;

/// Maps each text to the one-hot axis of the first keyword it contains
/// (case-insensitive). Texts matching no keyword land on the last axis.
pub struct OneHotEmbedder {
    keywords: Vec<String>,
    dim: usize,
}

impl OneHotEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self { keywords: keywords.iter().map(|k| k.to_lowercase()).collect(), dim: keywords.len() + 1 }
    }

    fn axis(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        self.keywords.iter().position(|k| lower.contains(k.as_str())).unwrap_or(self.dim - 1)
    }
}

impl Embedder for OneHotEmbedder {
    fn id(&self) -> &str {
        "one-hot"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dim];
                v[self.axis(t)] = 1.0;
                v
            })
            .collect())
    }
}

/// Sleeps for `delay`, then fails every call.
pub struct FailingEmbedder {
    pub dim: usize,
    pub delay: Duration,
}

impl Embedder for FailingEmbedder {
    fn id(&self) -> &str {
        "failing"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, _texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(self.delay);
        bail!("embedding backend unavailable")
    }
}

/// Delegates to `inner` after sleeping `delay` on query embeddings only.
pub struct SlowEmbedder {
    pub inner: Arc<dyn Embedder>,
    pub delay: Duration,
}

impl Embedder for SlowEmbedder {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        if kind == EmbedKind::Query {
            std::thread::sleep(self.delay);
        }
        self.inner.embed_batch(texts, kind)
    }
}

/// Passes passage embeddings through to `inner` and fails every query, so a
/// generation built with `inner` loads but cannot be searched semantically.
pub struct QueryFailingEmbedder {
    pub inner: Arc<dyn Embedder>,
}

impl Embedder for QueryFailingEmbedder {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        if kind == EmbedKind::Query {
            bail!("query encoder unavailable");
        }
        self.inner.embed_batch(texts, kind)
    }
}

/// Returns vectors of the wrong length.
pub struct WrongDimEmbedder {
    pub dim: usize,
}

impl Embedder for WrongDimEmbedder {
    fn id(&self) -> &str {
        "wrong-dim"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; self.dim + 1]).collect())
    }
}
