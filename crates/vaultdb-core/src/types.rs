//! Domain types shared by the chunker, both engines and the retrieval service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// A source note read from the vault.
///
/// - `path`: vault-relative path with `/` separators
/// - `title`: file stem (`Augmented Language Models` for `Augmented Language Models.md`)
/// - `text`: raw contents, lossily decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub path: String,
    pub title: String,
    pub text: String,
    pub modified: DateTime<Utc>,
}

impl Note {
    /// Build a note from a vault-relative path, deriving the title from the file stem.
    pub fn new(path: impl Into<String>, text: impl Into<String>, modified: DateTime<Utc>) -> Self {
        let path = path.into();
        let title = title_from_path(&path);
        Self { path, title, text: text.into(), modified }
    }
}

pub fn title_from_path(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// A contiguous span of one note, the unit both engines index.
///
/// `id` is derived from `note_path` and `position` only, so a rebuild over the
/// same vault yields the same ids. `header` is the closest heading above the
/// chunk's first block. `position`/`total` locate the chunk within its note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub note_path: String,
    pub title: String,
    pub header: Option<String>,
    pub text: String,
    pub position: usize,
    pub total: usize,
}

impl Chunk {
    pub fn make_id(note_path: &str, position: usize) -> ChunkId {
        format!("{note_path}#{position}")
    }
}

/// Which engine produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Keyword,
    Semantic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => f.write_str("keyword"),
            Self::Semantic => f.write_str("semantic"),
        }
    }
}

/// The minimal surface returned by both engines.
///
/// `score` is engine-specific (BM25 or cosine similarity); higher is better,
/// but scores of different engines are not comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// Whether a text is embedded as an indexed passage or as a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Passage,
    Query,
}

/// One entry of a fused result list, ready for source-attributed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub title: String,
    pub chunk: String,
    pub path: String,
    pub id: ChunkId,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
}
