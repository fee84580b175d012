//! Typed view of the configuration. Every section has defaults so an empty
//! `config.toml` is a working setup.

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub vault: VaultSettings,
    pub chunking: ChunkingConfig,
    pub keyword: KeywordSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub search: SearchSettings,
    pub store: StoreSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.keyword.validate()?;
        self.embedding.validate()?;
        self.search.validate()?;
        if self.store.keep_generations == 0 {
            return Err(Error::InvalidConfig("store.keep_generations must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub vault_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { vault_dir: "vault".to_string(), index_dir: "index".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// File extension of notes, without the dot.
    pub extension: String,
    pub skip_hidden: bool,
    /// Notes with fewer lines are left out of the index.
    pub min_lines: usize,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self { extension: "md".to_string(), skip_hidden: true, min_lines: 0 }
    }
}

/// Per-field boosts applied on top of the body's BM25 score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordSettings {
    pub title_boost: f32,
    pub header_boost: f32,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self { title_boost: 5.0, header_boost: 2.0 }
    }
}

impl KeywordSettings {
    fn validate(&self) -> Result<()> {
        let valid = |boost: f32| boost.is_finite() && boost >= 0.0;
        if valid(self.title_boost) && valid(self.header_boost) {
            return Ok(());
        }
        Err(Error::InvalidConfig(format!(
            "keyword: boosts must be finite and non-negative (title_boost={}, header_boost={})",
            self.title_boost, self.header_boost
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic feature-hashing embedder; no model files needed.
    Hash,
    /// BERT-family sentence encoder loaded from `model_dir`.
    Bert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model_dir: Option<String>,
    /// Output dimension of the hash provider. BERT models report their own.
    pub dim: usize,
    pub batch_size: usize,
    pub max_concurrency: usize,
    /// Token budget per text for model-based providers.
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model_dir: None,
            dim: 384,
            batch_size: 16,
            max_concurrency: 2,
            max_len: 512,
        }
    }
}

impl EmbeddingSettings {
    fn validate(&self) -> Result<()> {
        if self.dim == 0 || self.batch_size == 0 || self.max_concurrency == 0 || self.max_len == 0 {
            return Err(Error::InvalidConfig(
                "embedding: dim, batch_size, max_concurrency and max_len must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    /// Below this many rows the semantic table is searched exhaustively.
    pub ann_min_rows: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self { ann_min_rows: 4096 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    /// Hits requested from each engine before fusion.
    pub candidate_pool: usize,
    pub rrf_k: usize,
    pub engine_timeout_ms: u64,
    pub deadline_ms: u64,
    pub max_context_tokens: Option<usize>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            candidate_pool: 10,
            rrf_k: 60,
            engine_timeout_ms: 1_500,
            deadline_ms: 5_000,
            max_context_tokens: None,
        }
    }
}

impl SearchSettings {
    fn validate(&self) -> Result<()> {
        if self.default_k == 0 || self.candidate_pool == 0 {
            return Err(Error::InvalidConfig("search: default_k and candidate_pool must be positive".into()));
        }
        if self.engine_timeout_ms == 0 || self.engine_timeout_ms > self.deadline_ms {
            return Err(Error::InvalidConfig(format!(
                "search: engine_timeout_ms ({}) must be in 1..=deadline_ms ({})",
                self.engine_timeout_ms, self.deadline_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub keep_generations: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { keep_generations: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().expect("defaults are valid");
    }

    #[test]
    fn engine_timeout_cannot_exceed_deadline() {
        let mut settings = Settings::default();
        settings.search.engine_timeout_ms = 10_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn keyword_boosts_must_be_finite_and_non_negative() {
        for boost in [-1.0, f32::NAN, f32::INFINITY] {
            let mut settings = Settings::default();
            settings.keyword.title_boost = boost;
            assert!(settings.validate().is_err(), "title_boost={boost}");
        }
        let mut settings = Settings::default();
        settings.keyword.header_boost = 0.0;
        settings.validate().expect("zero disables the field");
    }

    #[test]
    fn provider_parses_lowercase() {
        let p: EmbeddingProvider = serde_json::from_str("\"bert\"").expect("parse");
        assert_eq!(p, EmbeddingProvider::Bert);
    }
}
