//! Query-time retrieval over the active generation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use vaultdb_core::chunker::estimate_tokens;
use vaultdb_core::settings::SearchSettings;
use vaultdb_core::traits::{Embedder, TextTokenizer};
use vaultdb_core::{Error, Result, RetrievedChunk, SearchHit, SourceKind};
use vaultdb_text::KeywordSearcher;
use vaultdb_vector::embed_query;

use crate::fusion::{reciprocal_rank_fusion, FusedHit};
use crate::store::{Generation, IndexStore};

/// Hybrid search service. Holds the current generation behind a lock that is
/// only taken to clone or swap the `Arc`; each query runs on its own snapshot.
pub struct RetrievalService {
    store: IndexStore,
    current: RwLock<Arc<Generation>>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn TextTokenizer>,
    settings: SearchSettings,
}

async fn with_timeout<F>(engine: SourceKind, limit: Duration, fut: F) -> Result<Vec<SearchHit>>
where
    F: Future<Output = Result<Vec<SearchHit>>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::engine(engine, format!("timed out after {limit:?}"))),
    }
}

impl RetrievalService {
    /// Open the store's active generation.
    pub async fn open(
        store: IndexStore,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn TextTokenizer>,
        settings: SearchSettings,
    ) -> Result<Self> {
        let generation = store.load_active(&tokenizer).await?;
        Ok(Self { store, current: RwLock::new(Arc::new(generation)), embedder, tokenizer, settings })
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// The generation new queries will run against.
    pub async fn snapshot(&self) -> Arc<Generation> {
        self.current.read().await.clone()
    }

    /// Load the store's active generation and swap it in. Queries already
    /// running keep the generation they started with.
    pub async fn reload(&self) -> Result<String> {
        let generation = self.store.load_active(&self.tokenizer).await?;
        let id = generation.id().to_string();
        *self.current.write().await = Arc::new(generation);
        info!(%id, "retrieval service switched generation");
        Ok(id)
    }

    pub async fn search_default(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        self.search(query, self.settings.default_k).await
    }

    /// Top `k` chunks for `query` from both engines, fused by reciprocal rank.
    ///
    /// One failed or timed-out engine degrades to the other's ranking; both
    /// failing is `RetrievalUnavailable`. The whole call is bounded by
    /// `deadline_ms`.
    #[instrument(skip(self), fields(generation))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query is empty".into()));
        }
        if k == 0 {
            return Err(Error::InvalidQuery("k must be at least 1".into()));
        }
        let deadline = Duration::from_millis(self.settings.deadline_ms);
        match tokio::time::timeout(deadline, self.search_snapshot(query, k)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RetrievalTimeout(deadline)),
        }
    }

    async fn search_snapshot(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let generation = self.snapshot().await;
        tracing::Span::current().record("generation", generation.id());
        let engine_timeout = Duration::from_millis(self.settings.engine_timeout_ms);
        // each engine must be able to fill k on its own when the other fails
        let pool = self.settings.candidate_pool.max(k);

        let (keyword, semantic) = tokio::join!(
            with_timeout(SourceKind::Keyword, engine_timeout, self.keyword_leg(&generation, query, pool)),
            with_timeout(SourceKind::Semantic, engine_timeout, self.semantic_leg(&generation, query, pool)),
        );
        let (keyword, semantic) = match (keyword, semantic) {
            (Ok(kw), Ok(sem)) => (kw, sem),
            (Ok(kw), Err(e)) => {
                warn!(error = %e, "semantic engine failed, serving keyword results only");
                (kw, Vec::new())
            }
            (Err(e), Ok(sem)) => {
                warn!(error = %e, "keyword engine failed, serving semantic results only");
                (Vec::new(), sem)
            }
            (Err(kw), Err(sem)) => return Err(Error::RetrievalUnavailable(format!("{kw}; {sem}"))),
        };
        debug!(keyword = ?keyword.iter().map(|h| &h.id).collect::<Vec<_>>(), "keyword hits");
        debug!(semantic = ?semantic.iter().map(|h| &h.id).collect::<Vec<_>>(), "semantic hits");

        let fused = reciprocal_rank_fusion(&keyword, &semantic, self.settings.rrf_k);
        Ok(self.assemble(&generation, fused, k))
    }

    async fn keyword_leg(&self, generation: &Generation, query: &str, pool: usize) -> Result<Vec<SearchHit>> {
        let index = generation
            .keyword
            .clone()
            .ok_or_else(|| Error::engine(SourceKind::Keyword, "keyword index not loaded"))?;
        let searcher = KeywordSearcher::new(index);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || searcher.search(&query, pool))
            .await
            .map_err(|e| Error::engine(SourceKind::Keyword, e))?
    }

    async fn semantic_leg(&self, generation: &Generation, query: &str, pool: usize) -> Result<Vec<SearchHit>> {
        let index = generation
            .semantic
            .as_ref()
            .ok_or_else(|| Error::engine(SourceKind::Semantic, "semantic index not loaded"))?;
        let manifest = &generation.manifest;
        if manifest.embedder_id != self.embedder.id() || manifest.dim != self.embedder.dim() {
            return Err(Error::engine(
                SourceKind::Semantic,
                format!(
                    "generation embedded with {} (dim {}), running {} (dim {})",
                    manifest.embedder_id,
                    manifest.dim,
                    self.embedder.id(),
                    self.embedder.dim()
                ),
            ));
        }
        let vector = embed_query(self.embedder.clone(), query)
            .await
            .map_err(|e| Error::engine(SourceKind::Semantic, format!("{e:#}")))?;
        index
            .search_vec(&vector, pool)
            .await
            .map_err(|e| Error::engine(SourceKind::Semantic, format!("{e:#}")))
    }

    /// Resolve fused ids to chunks, truncate to `k`, then apply the optional
    /// context token budget.
    fn assemble(&self, generation: &Generation, fused: Vec<FusedHit>, k: usize) -> Vec<RetrievedChunk> {
        let mut out = Vec::with_capacity(k.min(fused.len()));
        let mut tokens = 0usize;
        for hit in fused {
            if out.len() == k {
                break;
            }
            let Some(chunk) = generation.chunk(&hit.id) else {
                warn!(id = %hit.id, "fused hit has no chunk in this generation");
                continue;
            };
            if let Some(budget) = self.settings.max_context_tokens {
                tokens += estimate_tokens(&chunk.text);
                if tokens > budget {
                    break;
                }
            }
            out.push(RetrievedChunk {
                title: chunk.title.clone(),
                chunk: chunk.text.clone(),
                path: chunk.note_path.clone(),
                id: chunk.id.clone(),
                score: hit.score as f32,
                keyword_rank: hit.keyword_rank,
                semantic_rank: hit.semantic_rank,
            });
        }
        out
    }
}
