//! BERT-family sentence encoder (E5, MiniLM, BGE-small) on candle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use vaultdb_core::traits::Embedder;
use vaultdb_core::EmbedKind;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

impl BertEmbedder {
    /// Load `tokenizer.json`, `config.json` and `model.safetensors` (or
    /// `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {e}", tokenizer_path.display()))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().and_then(|n| n.to_str()).unwrap_or("bert");
        let id = format!("bert:{name}");
        info!(model = %id, dim = config.hidden_size, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size, max_len: max_len.max(1), id })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

/// E5-style input: role prefix plus collapsed whitespace.
pub fn prepare_input(text: &str, kind: EmbedKind) -> String {
    let prefix = match kind {
        EmbedKind::Passage => "passage: ",
        EmbedKind::Query => "query: ",
    };
    let mut out = String::with_capacity(prefix.len() + text.len());
    out.push_str(prefix);
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

impl Embedder for BertEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs: Vec<String> = texts.iter().map(|t| prepare_input(t, kind)).collect();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, &inputs, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        debug!(batch = texts.len(), ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Model directory from settings, then `APP_MODEL_DIR`, then `models/e5-small-v2`.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(PathBuf::from)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::iter::once(PathBuf::from("models/e5-small-v2")));
    for dir in candidates {
        if dir.join("config.json").exists() {
            info!(dir = %dir.display(), "using model dir");
            return Ok(dir);
        }
    }
    Err(anyhow!("Could not locate an embedding model directory (set embedding.model_dir or APP_MODEL_DIR)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_get_role_prefix_and_collapsed_whitespace() {
        assert_eq!(prepare_input("  a\n\tb  c ", EmbedKind::Passage), "passage: a b c");
        assert_eq!(prepare_input("what is rag", EmbedKind::Query), "query: what is rag");
    }

    #[test]
    fn missing_model_dir_is_an_error() {
        let tmp = std::env::temp_dir().join("vaultdb-no-such-model");
        assert!(BertEmbedder::load(&tmp, 16).is_err());
    }
}
