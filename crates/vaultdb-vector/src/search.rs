use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use arrow_array::{Float32Array, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, DistanceType, Table};
use tracing::{debug, instrument};

use vaultdb_core::{ChunkId, SearchHit, SourceKind};

use crate::schema::TABLE_NAME;

/// An opened semantic table of one generation.
#[derive(Clone)]
pub struct SemanticIndex {
    table: Table,
    dim: usize,
    rows: usize,
}

impl SemanticIndex {
    pub async fn open(dir: &Path, dim: usize) -> Result<Self> {
        let db = connect(dir.to_string_lossy().as_ref()).execute().await?;
        let table = db.open_table(TABLE_NAME).execute().await?;
        let rows = table.count_rows(None).await?;
        Ok(Self { table, dim, rows })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Nearest `k` chunks by cosine similarity (`1 - distance`), ties by id.
    #[instrument(skip(self, query), fields(rows = self.rows))]
    pub async fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        ensure!(query.len() == self.dim, "query vector has {} dims, index has {}", query.len(), self.dim);
        if k == 0 || self.rows == 0 {
            return Ok(Vec::new());
        }
        let mut stream = self
            .table
            .vector_search(query.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow!("semantic result missing id column"))?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("semantic result missing _distance column"))?;
            for i in 0..batch.num_rows() {
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    score: 1.0 - distances.value(i),
                    source: SourceKind::Semantic,
                });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        debug!(hits = hits.len(), "semantic search");
        Ok(hits)
    }

    /// Every chunk id in the table, ascending.
    pub async fn chunk_ids(&self) -> Result<Vec<ChunkId>> {
        let mut stream = self.table.query().select(Select::columns(&["id"])).execute().await?;
        let mut ids = Vec::with_capacity(self.rows);
        while let Some(batch) = stream.try_next().await? {
            let col = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow!("semantic table missing id column"))?;
            ids.extend((0..batch.num_rows()).map(|i| col.value(i).to_string()));
        }
        ids.sort();
        Ok(ids)
    }
}
