//! Keyword index: a tantivy index over chunk body, note title and section header.
//!
//! Chunks are added in id order and each carries its position in that order
//! (`ord`), so the same chunk set yields the same postings whatever the input
//! order, and score ties can be broken by id without loading stored documents.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tantivy::postings::Postings;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{
    doc, DocAddress, DocSet, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
    TERMINATED,
};
use tracing::{debug, info};

use vaultdb_core::settings::KeywordSettings;
use vaultdb_core::traits::TextTokenizer;
use vaultdb_core::{Chunk, ChunkId, Error, Result, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer, KeywordFields, ORD_FIELD};

const WRITER_MEMORY: usize = 50_000_000;

fn unavailable(dir: &Path, e: impl std::fmt::Display) -> Error {
    Error::engine(SourceKind::Keyword, format!("keyword index at {}: {e}", dir.display()))
}

pub struct KeywordIndex {
    reader: IndexReader,
    fields: KeywordFields,
    /// Chunk ids indexed by `ord`.
    chunk_ids: Vec<ChunkId>,
    params: KeywordSettings,
    tokenizer: Arc<dyn TextTokenizer>,
}

impl KeywordIndex {
    /// Index every chunk's text, note title and section header into `dir`,
    /// replacing whatever was there.
    ///
    /// Fails on duplicate chunk ids; an empty chunk set is a valid, empty index.
    pub fn build(
        dir: &Path,
        chunks: &[Chunk],
        tokenizer: Arc<dyn TextTokenizer>,
        params: KeywordSettings,
    ) -> Result<Self> {
        let mut sorted: Vec<&Chunk> = chunks.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        let mut seen = HashSet::with_capacity(sorted.len());
        for c in &sorted {
            if !seen.insert(c.id.as_str()) {
                return Err(Error::build(format!("duplicate chunk id {}", c.id)));
            }
        }

        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        let schema = build_schema();
        let index = Index::create_in_dir(dir, schema.clone()).map_err(Error::build)?;
        register_tokenizer(&index, tokenizer.clone());
        let fields = KeywordFields::from_schema(&schema).map_err(Error::build)?;

        // one indexing thread keeps documents in insertion order
        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY).map_err(Error::build)?;
        for (ord, chunk) in sorted.iter().enumerate() {
            writer
                .add_document(doc!(
                    fields.id => chunk.id.clone(),
                    fields.ord => ord as u64,
                    fields.body => chunk.text.clone(),
                    fields.title => chunk.title.clone(),
                    fields.header => chunk.header.clone().unwrap_or_default(),
                ))
                .map_err(Error::build)?;
        }
        writer.commit().map_err(Error::build)?;
        writer.wait_merging_threads().map_err(Error::build)?;

        let chunk_ids: Vec<ChunkId> = sorted.into_iter().map(|c| c.id.clone()).collect();
        let reader = open_reader(&index).map_err(Error::build)?;
        info!(chunks = chunk_ids.len(), dir = %dir.display(), "keyword index built");
        Ok(Self { reader, fields, chunk_ids, params, tokenizer })
    }

    /// Open an index written by [`KeywordIndex::build`].
    ///
    /// A missing or corrupt index is reported as the keyword engine being
    /// unavailable.
    pub fn open(dir: &Path, tokenizer: Arc<dyn TextTokenizer>, params: KeywordSettings) -> Result<Self> {
        let index = Index::open_in_dir(dir).map_err(|e| unavailable(dir, e))?;
        register_tokenizer(&index, tokenizer.clone());
        let fields = KeywordFields::from_schema(&index.schema()).map_err(|e| unavailable(dir, e))?;
        let reader = open_reader(&index).map_err(|e| unavailable(dir, e))?;
        let chunk_ids = stored_chunk_ids(&reader.searcher(), &fields).map_err(|e| unavailable(dir, e))?;
        debug!(chunks = chunk_ids.len(), dir = %dir.display(), "keyword index opened");
        Ok(Self { reader, fields, chunk_ids, params, tokenizer })
    }

    /// Chunk ids stored in the index at `dir`, in ascending order.
    pub fn read_chunk_ids(dir: &Path) -> Result<Vec<ChunkId>> {
        let index = Index::open_in_dir(dir).map_err(|e| unavailable(dir, e))?;
        let fields = KeywordFields::from_schema(&index.schema()).map_err(|e| unavailable(dir, e))?;
        let reader = open_reader(&index).map_err(|e| unavailable(dir, e))?;
        stored_chunk_ids(&reader.searcher(), &fields).map_err(|e| unavailable(dir, e))
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    /// Indexed chunk ids in ascending order.
    pub fn chunk_ids(&self) -> &[ChunkId] {
        &self.chunk_ids
    }

    pub fn params(&self) -> &KeywordSettings {
        &self.params
    }

    pub fn tokenizer(&self) -> &Arc<dyn TextTokenizer> {
        &self.tokenizer
    }

    pub(crate) fn fields(&self) -> &KeywordFields {
        &self.fields
    }

    pub(crate) fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Body postings of an already-analyzed term as `(chunk id, term frequency)`,
    /// in ascending id order.
    pub fn postings(&self, text: &str) -> Result<Vec<(ChunkId, u32)>> {
        let fail = |e: &dyn std::fmt::Display| Error::engine(SourceKind::Keyword, format!("postings for {text:?}: {e}"));
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.fields.body, text);
        let mut out = Vec::new();
        for segment in searcher.segment_readers() {
            let ords = segment.fast_fields().u64(ORD_FIELD).map_err(|e| fail(&e))?;
            let inverted = segment.inverted_index(self.fields.body).map_err(|e| fail(&e))?;
            let Some(mut postings) =
                inverted.read_postings(&term, IndexRecordOption::WithFreqs).map_err(|e| fail(&e))?
            else {
                continue;
            };
            let mut doc = postings.doc();
            while doc != TERMINATED {
                let id = ords
                    .first(doc)
                    .and_then(|ord| self.chunk_ids.get(ord as usize))
                    .ok_or_else(|| fail(&format!("doc {doc} has no chunk id")))?;
                out.push((id.clone(), postings.term_freq()));
                doc = postings.advance();
            }
        }
        out.sort();
        Ok(out)
    }
}

fn open_reader(index: &Index) -> tantivy::Result<IndexReader> {
    // generations are immutable once published
    index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()
}

/// Read `(ord, id)` from every stored document and check the ords are exactly
/// `0..n`, so every search hit maps back to one chunk.
fn stored_chunk_ids(searcher: &Searcher, fields: &KeywordFields) -> std::result::Result<Vec<ChunkId>, String> {
    let total = searcher.num_docs() as usize;
    let mut slots: Vec<Option<ChunkId>> = vec![None; total];
    for (segment_ord, segment) in searcher.segment_readers().iter().enumerate() {
        for doc_id in 0..segment.max_doc() {
            let doc: TantivyDocument =
                searcher.doc(DocAddress::new(segment_ord as u32, doc_id)).map_err(|e| e.to_string())?;
            let id = doc.get_first(fields.id).and_then(|v| v.as_str()).ok_or("document without id")?;
            let ord = doc.get_first(fields.ord).and_then(|v| v.as_u64()).ok_or("document without ord")?;
            let slot = slots
                .get_mut(ord as usize)
                .ok_or_else(|| format!("ord {ord} out of range for {total} documents"))?;
            if slot.replace(id.to_string()).is_some() {
                return Err(format!("ord {ord} assigned twice"));
            }
        }
    }
    let ids = slots.into_iter().collect::<Option<Vec<_>>>().ok_or("ords are not contiguous")?;
    if ids.windows(2).any(|w| w[0] >= w[1]) {
        return Err("chunk ids are not in ascending order".into());
    }
    Ok(ids)
}
