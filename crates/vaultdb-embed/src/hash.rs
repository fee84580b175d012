use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use vaultdb_core::traits::Embedder;
use vaultdb_core::EmbedKind;

/// Signed feature hashing of lowercased words into `dim` buckets.
///
/// Needs no model files and is fully deterministic, so texts sharing words get
/// similar vectors. Passage and query embeddings are identical.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("hash-xxh64-{}", dim.max(1)) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let mut add = |token: &str| {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += if (h >> 63) == 0 { 1.0 } else { -1.0 };
        };

        let mut any = false;
        for word in text.split_whitespace() {
            let token = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if !token.is_empty() {
                add(&token);
                any = true;
            }
        }
        if !any && !text.trim().is_empty() {
            add(text.trim());
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
