//! Reciprocal Rank Fusion of the keyword and semantic hit lists.
//!
//! `score(d) = Σ 1 / (rrf_k + rank(d))` over the lists containing `d`, with
//! 1-based ranks. Raw engine scores are ignored.

use std::collections::BTreeMap;

use vaultdb_core::{ChunkId, SearchHit};

/// Constant from Cormack, Clarke and Buettcher (SIGIR 2009).
pub const RRF_K: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: ChunkId,
    pub score: f64,
    pub keyword_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

impl FusedHit {
    fn best_rank(&self) -> usize {
        match (self.keyword_rank, self.semantic_rank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => usize::MAX,
        }
    }
}

fn add_list<'a>(
    fused: &mut BTreeMap<&'a str, FusedHit>,
    hits: &'a [SearchHit],
    rrf_k: usize,
    set_rank: fn(&mut FusedHit, usize),
    has_rank: fn(&FusedHit) -> bool,
) {
    for (i, hit) in hits.iter().enumerate() {
        let rank = i + 1;
        let entry = fused.entry(hit.id.as_str()).or_insert_with(|| FusedHit {
            id: hit.id.clone(),
            score: 0.0,
            keyword_rank: None,
            semantic_rank: None,
        });
        // a repeated id within one list only counts at its best rank
        if has_rank(entry) {
            continue;
        }
        set_rank(entry, rank);
        entry.score += 1.0 / (rrf_k + rank) as f64;
    }
}

/// Fuse two ranked lists into one, ordered by fused score descending, then by
/// the better engine rank, then by chunk id.
pub fn reciprocal_rank_fusion(keyword: &[SearchHit], semantic: &[SearchHit], rrf_k: usize) -> Vec<FusedHit> {
    let mut fused: BTreeMap<&str, FusedHit> = BTreeMap::new();
    add_list(&mut fused, keyword, rrf_k, |h, r| h.keyword_rank = Some(r), |h| h.keyword_rank.is_some());
    add_list(&mut fused, semantic, rrf_k, |h, r| h.semantic_rank = Some(r), |h| h.semantic_rank.is_some());

    let mut out: Vec<FusedHit> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}
