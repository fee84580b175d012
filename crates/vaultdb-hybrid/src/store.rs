//! Versioned on-disk generations with an atomically replaced `CURRENT` pointer.
//!
//! ```text
//! <root>/CURRENT
//! <root>/generations/<id>/{manifest.json, chunks.json, keyword/, semantic/}
//! <root>/staging/<id>/
//! ```
//!
//! Builds write into `staging/`. A staged generation is removed on drop unless
//! it was published; publishing renames it under `generations/` and only then
//! rewrites `CURRENT`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use vaultdb_core::settings::KeywordSettings;
use vaultdb_core::traits::TextTokenizer;
use vaultdb_core::{Chunk, ChunkId, ChunkingConfig, Error, Result, SourceKind};
use vaultdb_text::KeywordIndex;
use vaultdb_vector::SemanticIndex;

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const STAGING_DIR: &str = "staging";
const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const KEYWORD_DIR: &str = "keyword";
const SEMANTIC_DIR: &str = "semantic";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub note_count: usize,
    pub chunk_count: usize,
    pub embedder_id: String,
    pub dim: usize,
    pub ann: bool,
    pub chunking: ChunkingConfig,
    pub keyword: KeywordSettings,
    /// blake3 over chunk ids and texts.
    pub content_digest: String,
}

/// blake3 digest of the chunk set, independent of input order.
pub fn content_digest(chunks: &[Chunk]) -> String {
    let mut sorted: Vec<&Chunk> = chunks.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let mut hasher = blake3::Hasher::new();
    for c in sorted {
        hasher.update(c.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(c.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing within the process, so ids sort by creation order.
fn next_stamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_STAMP_MICROS.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP_MICROS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return Utc.timestamp_micros(next).single().unwrap_or_else(Utc::now),
            Err(current) => last = current,
        }
    }
}

/// `g<UTC timestamp>-<first 8 hex of the content digest>`.
fn generation_id(stamp: DateTime<Utc>, digest: &str) -> String {
    let short: String = digest.chars().take(8).collect();
    format!("g{}-{short}", stamp.format("%Y%m%dT%H%M%S%6fZ"))
}

pub struct IndexStore {
    root: PathBuf,
}

/// A build in progress under `staging/<id>`.
pub struct StagedGeneration {
    id: String,
    created_at: DateTime<Utc>,
    dir: PathBuf,
    published: bool,
}

impl StagedGeneration {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keyword_dir(&self) -> PathBuf {
        self.dir.join(KEYWORD_DIR)
    }

    pub fn semantic_dir(&self) -> PathBuf {
        self.dir.join(SEMANTIC_DIR)
    }

    pub fn write_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        write_json(&self.dir.join(CHUNKS_FILE), &chunks)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        write_json(&self.dir.join(MANIFEST_FILE), manifest)
    }

    /// Discard the staged artifacts now rather than at drop.
    pub fn abort(self) {}
}

impl Drop for StagedGeneration {
    fn drop(&mut self) {
        if self.published || !self.dir.exists() {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(id = %self.id, "staged generation discarded"),
            Err(e) => warn!(id = %self.id, error = %e, "failed to remove staging directory"),
        }
    }
}

/// One loaded generation. An engine whose artifact cannot be opened is `None`
/// and the service runs without it.
pub struct Generation {
    pub manifest: Manifest,
    chunks: HashMap<ChunkId, Chunk>,
    pub keyword: Option<Arc<KeywordIndex>>,
    pub semantic: Option<SemanticIndex>,
}

impl Generation {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn mismatch(generation: &str, right: &'static str, left: &BTreeSet<&str>, other: &BTreeSet<&str>) -> Option<Error> {
    if left == other {
        return None;
    }
    Some(Error::GenerationMismatch {
        generation: generation.to_string(),
        left: "chunks",
        left_count: left.len(),
        right,
        right_count: other.len(),
        missing: left.symmetric_difference(other).count(),
    })
}

impl IndexStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(GENERATIONS_DIR))?;
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, id: &str) -> PathBuf {
        self.root.join(GENERATIONS_DIR).join(id)
    }

    /// Allocate a fresh staging directory for a chunk set with `digest`.
    pub fn begin(&self, digest: &str) -> Result<StagedGeneration> {
        let created_at = next_stamp();
        let id = generation_id(created_at, digest);
        let dir = self.root.join(STAGING_DIR).join(&id);
        fs::create_dir_all(&dir)?;
        debug!(%id, "staging generation");
        Ok(StagedGeneration { id, created_at, dir, published: false })
    }

    /// Validate a staged generation and make it the active one.
    ///
    /// The chunk table, keyword index and semantic table must hold the same
    /// chunk-id set. On any failure the staging directory is removed and
    /// `CURRENT` is left as it was.
    #[instrument(skip_all, fields(id = %staged.id))]
    pub async fn publish(&self, mut staged: StagedGeneration) -> Result<String> {
        let manifest: Manifest = read_json(&staged.dir.join(MANIFEST_FILE))?;
        let chunks: Vec<Chunk> = read_json(&staged.dir.join(CHUNKS_FILE))?;
        let keyword_ids = KeywordIndex::read_chunk_ids(&staged.keyword_dir())?;
        let semantic = SemanticIndex::open(&staged.semantic_dir(), manifest.dim)
            .await
            .map_err(|e| Error::engine(SourceKind::Semantic, format!("{e:#}")))?;
        let semantic_ids = semantic
            .chunk_ids()
            .await
            .map_err(|e| Error::engine(SourceKind::Semantic, format!("{e:#}")))?;

        let chunk_ids: BTreeSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let keyword_ids: BTreeSet<&str> = keyword_ids.iter().map(String::as_str).collect();
        let semantic_ids: BTreeSet<&str> = semantic_ids.iter().map(String::as_str).collect();
        if chunk_ids.len() != chunks.len() {
            return Err(Error::build(format!("generation {} has duplicate chunk ids", staged.id)));
        }
        if let Some(err) = mismatch(&staged.id, "keyword", &chunk_ids, &keyword_ids)
            .or_else(|| mismatch(&staged.id, "semantic", &chunk_ids, &semantic_ids))
        {
            return Err(err);
        }
        if manifest.chunk_count != chunks.len() {
            return Err(Error::build(format!(
                "manifest records {} chunks, table has {}",
                manifest.chunk_count,
                chunks.len()
            )));
        }

        let target = self.generation_dir(&staged.id);
        fs::rename(&staged.dir, &target)?;
        staged.published = true;
        self.write_current(&staged.id)?;
        info!(id = %staged.id, chunks = chunks.len(), "generation published");
        Ok(staged.id.clone())
    }

    fn write_current(&self, id: &str) -> Result<()> {
        let tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(id.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.root.join(CURRENT_FILE))?;
        Ok(())
    }

    pub fn active_id(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(CURRENT_FILE)) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Published generation ids, oldest first.
    pub fn generations(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join(GENERATIONS_DIR))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn manifest(&self, id: &str) -> Result<Manifest> {
        read_json(&self.generation_dir(id).join(MANIFEST_FILE))
    }

    /// Load a published generation. The chunk table is required; a keyword or
    /// semantic artifact that fails to open is logged and left out.
    ///
    /// `tokenizer` must analyze text the way the build did.
    #[instrument(skip(self, tokenizer))]
    pub async fn load(&self, id: &str, tokenizer: &Arc<dyn TextTokenizer>) -> Result<Generation> {
        let dir = self.generation_dir(id);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("generation {id}")));
        }
        let manifest: Manifest = read_json(&dir.join(MANIFEST_FILE))?;
        let chunks: Vec<Chunk> = read_json(&dir.join(CHUNKS_FILE))?;
        let chunks: HashMap<ChunkId, Chunk> = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();

        let keyword = match KeywordIndex::open(&dir.join(KEYWORD_DIR), tokenizer.clone(), manifest.keyword) {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                warn!(%id, error = %e, "keyword index unavailable");
                None
            }
        };
        let semantic = match SemanticIndex::open(&dir.join(SEMANTIC_DIR), manifest.dim).await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(%id, error = %format!("{e:#}"), "semantic index unavailable");
                None
            }
        };
        info!(%id, chunks = chunks.len(), keyword = keyword.is_some(), semantic = semantic.is_some(), "generation loaded");
        Ok(Generation { manifest, chunks, keyword, semantic })
    }

    pub async fn load_active(&self, tokenizer: &Arc<dyn TextTokenizer>) -> Result<Generation> {
        let id = self
            .active_id()?
            .ok_or_else(|| Error::NotFound(format!("no active generation in {}", self.root.display())))?;
        self.load(&id, tokenizer).await
    }

    /// Delete all but the newest `keep` generations. Returns the removed ids.
    ///
    /// The active generation and `previous` (the one active before the latest
    /// publish) are never deleted: a running service keeps serving `previous`
    /// until it reloads. A service that skipped more than one publish without
    /// reloading can still lose its generation.
    #[instrument(skip(self))]
    pub fn prune(&self, keep: usize, previous: Option<&str>) -> Result<Vec<String>> {
        let active = self.active_id()?;
        let ids = self.generations()?;
        let cut = ids.len().saturating_sub(keep);
        let mut removed = Vec::new();
        for id in &ids[..cut] {
            if active.as_deref() == Some(id.as_str()) || previous == Some(id.as_str()) {
                continue;
            }
            fs::remove_dir_all(self.generation_dir(id))?;
            removed.push(id.clone());
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), kept = ids.len() - removed.len(), "pruned generations");
        }
        Ok(removed)
    }
}
