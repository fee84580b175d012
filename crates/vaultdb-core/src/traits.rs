use crate::types::EmbedKind;

/// Text → fixed-length vector capability.
///
/// Implementations must return `dim()`-long vectors, one per input, and the
/// vector of a text must not depend on the other texts of the batch.
pub trait Embedder: Send + Sync {
    /// Stable identifier for model + version, recorded in each generation.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Text → normalized terms capability used by the keyword index.
pub trait TextTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}
