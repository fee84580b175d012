use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{DocId, Score, SegmentReader, Term};
use tracing::{debug, instrument, warn};

use vaultdb_core::{Error, Result, SearchHit, SourceKind};

use crate::index::KeywordIndex;
use crate::tantivy_utils::ORD_FIELD;

/// BM25 search over an opened [`KeywordIndex`], analyzing queries with the
/// tokenizer the index was built with.
#[derive(Clone)]
pub struct KeywordSearcher {
    index: Arc<KeywordIndex>,
}

impl KeywordSearcher {
    pub fn new(index: impl Into<Arc<KeywordIndex>>) -> Self {
        Self { index: index.into() }
    }

    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    /// Every analyzed query term against every field, OR-combined.
    fn build_query(&self, terms: &BTreeSet<String>) -> BooleanQuery {
        let fields = self.index.fields();
        let params = self.index.params();
        // body is unboosted; a zero boost leaves a field out
        let weighted: [(Field, Option<Score>); 3] = [
            (fields.body, None),
            (fields.title, Some(params.title_boost)),
            (fields.header, Some(params.header_boost)),
        ];

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in weighted {
            if boost.is_some_and(|b| b <= 0.0) {
                continue;
            }
            for term in terms {
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(Term::from_field_text(field, term), IndexRecordOption::WithFreqs));
                let query: Box<dyn Query> = match boost {
                    Some(b) => Box::new(BoostQuery::new(query, b)),
                    None => query,
                };
                clauses.push((Occur::Should, query));
            }
        }
        BooleanQuery::new(clauses)
    }

    /// Top `k` chunks by BM25, ties broken by ascending chunk id.
    ///
    /// Only chunks sharing at least one analyzed term with the query are
    /// returned, so every hit has a positive score.
    #[instrument(skip(self), fields(chunks = self.index.len()))]
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let terms: BTreeSet<String> = self.index.tokenizer().tokenize(query).into_iter().collect();
        if terms.is_empty() || k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.build_query(&terms);
        // ords follow id order, so the larger Reverse(ord) is the smaller id
        let collector = TopDocs::with_limit(k).tweak_score(move |segment: &SegmentReader| {
            let ords = segment.fast_fields().u64(ORD_FIELD).ok();
            move |doc: DocId, score: Score| {
                let ord = ords.as_ref().and_then(|c| c.first(doc)).unwrap_or(u64::MAX);
                (score, Reverse(ord))
            }
        });
        let top = self
            .index
            .searcher()
            .search(&query, &collector)
            .map_err(|e| Error::engine(SourceKind::Keyword, e))?;

        let mut hits = Vec::with_capacity(top.len());
        for ((score, Reverse(ord)), address) in top {
            let Some(id) = self.index.chunk_ids().get(ord as usize) else {
                warn!(?address, "keyword hit without a chunk id");
                continue;
            };
            if score > 0.0 {
                hits.push(SearchHit { id: id.clone(), score, source: SourceKind::Keyword });
            }
        }
        debug!(terms = terms.len(), hits = hits.len(), "keyword search");
        Ok(hits)
    }
}
