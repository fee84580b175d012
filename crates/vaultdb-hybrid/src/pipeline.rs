//! Full-rebuild pipeline: chunk, build both engines concurrently, publish.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use vaultdb_core::traits::{Embedder, TextTokenizer};
use vaultdb_core::vault::VaultReader;
use vaultdb_core::{Chunker, Error, Note, Result, Settings};
use vaultdb_text::KeywordIndex;
use vaultdb_vector::build_semantic_index;

use crate::store::{content_digest, IndexStore, Manifest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub generation: String,
    pub notes: usize,
    pub chunks: usize,
    pub ann: bool,
    pub pruned: Vec<String>,
}

pub struct IndexBuilder {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn TextTokenizer>,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>, tokenizer: Arc<dyn TextTokenizer>) -> Self {
        Self { settings, embedder, tokenizer, show_progress: false }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Read every note under `vault_dir` and build a new generation from them.
    pub async fn build_from_vault(&self, vault_dir: &Path, store: &IndexStore) -> Result<BuildReport> {
        let reader = VaultReader::new(vault_dir, self.settings.vault.clone());
        let notes = tokio::task::spawn_blocking(move || reader.read_notes())
            .await
            .map_err(|e| Error::build(format!("vault scan failed: {e}")))??;
        self.build(&notes, store).await
    }

    /// Build, validate and publish a generation for `notes`, then prune old
    /// generations. The active generation is untouched unless every step
    /// succeeds.
    #[instrument(skip_all, fields(notes = notes.len()))]
    pub async fn build(&self, notes: &[Note], store: &IndexStore) -> Result<BuildReport> {
        let chunker = Chunker::new(self.settings.chunking.clone())?;
        let chunks = chunker.chunk_notes(notes)?;
        if chunks.is_empty() {
            return Err(Error::build("no chunks: every note is empty"));
        }
        let digest = content_digest(&chunks);
        let staged = store.begin(&digest)?;
        staged.write_chunks(&chunks)?;
        info!(id = staged.id(), chunks = chunks.len(), "building indices");

        let chunks = Arc::new(chunks);
        let keyword_task = {
            let chunks = chunks.clone();
            let tokenizer = self.tokenizer.clone();
            let params = self.settings.keyword;
            let dir = staged.keyword_dir();
            tokio::task::spawn_blocking(move || KeywordIndex::build(&dir, &chunks, tokenizer, params).map(|_| ()))
        };
        let semantic_dir = staged.semantic_dir();
        let semantic_task = build_semantic_index(
            &semantic_dir,
            &chunks,
            self.embedder.clone(),
            &self.settings.embedding,
            &self.settings.vector,
            self.show_progress,
        );
        let (keyword, semantic) = tokio::join!(keyword_task, semantic_task);

        let keyword = keyword
            .map_err(|e| Error::build(format!("keyword index: {e}")))
            .and_then(|r| r.map_err(|e| Error::build(format!("keyword index: {e}"))));
        let semantic = semantic.map_err(|e| Error::build(format!("semantic index: {e:#}")));
        let semantic = match (keyword, semantic) {
            (Ok(()), Ok(build)) => build,
            (Err(e), _) | (_, Err(e)) => {
                error!(id = staged.id(), error = %e, "build failed, active generation unchanged");
                return Err(e);
            }
        };

        let manifest = Manifest {
            id: staged.id().to_string(),
            created_at: staged.created_at(),
            note_count: notes.len(),
            chunk_count: chunks.len(),
            embedder_id: semantic.embedder_id,
            dim: semantic.dim,
            ann: semantic.ann,
            chunking: self.settings.chunking.clone(),
            keyword: self.settings.keyword,
            content_digest: digest,
        };
        staged.write_manifest(&manifest)?;
        let previous = store.active_id()?;
        let generation = store.publish(staged).await?;

        let pruned = match store.prune(self.settings.store.keep_generations, previous.as_deref()) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "pruning old generations failed");
                Vec::new()
            }
        };
        Ok(BuildReport { generation, notes: notes.len(), chunks: chunks.len(), ann: semantic.ann, pruned })
    }
}
