//! Writes a generation's semantic table: embed every chunk, store `(id, vector)`
//! rows in a fresh LanceDB database, train an ANN index when the table is large.

use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Result};
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::connect;
use tracing::{info, instrument};

use vaultdb_core::settings::{EmbeddingSettings, VectorSettings};
use vaultdb_core::traits::Embedder;
use vaultdb_core::Chunk;

use crate::embed::{embed_passages, EmbedOptions};
use crate::index_build::{build_ivfpq_index, compute_ivfpq_params};
use crate::schema::{build_chunk_schema, TABLE_NAME};

const WRITE_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticBuild {
    pub rows: usize,
    pub dim: usize,
    pub embedder_id: String,
    pub ann: bool,
}

fn to_record_batch(ids: &[&str], vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
    let schema = build_chunk_schema(dim);
    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        vectors.iter().map(|v| Some(v.iter().copied().map(Some))),
        dim as i32,
    );
    Ok(RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(ids.to_vec())), Arc::new(vectors)])?)
}

/// Embed `chunks` and write them to `<dir>` as table `chunks`.
#[instrument(skip_all, fields(dir = %dir.display(), chunks = chunks.len()))]
pub async fn build_semantic_index(
    dir: &Path,
    chunks: &[Chunk],
    embedder: Arc<dyn Embedder>,
    embedding: &EmbeddingSettings,
    vector: &VectorSettings,
    show_progress: bool,
) -> Result<SemanticBuild> {
    let dim = embedder.dim();
    ensure!(dim > 0, "embedder {} reports dimension 0", embedder.id());
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let opts = EmbedOptions {
        batch_size: embedding.batch_size,
        max_concurrency: embedding.max_concurrency,
        show_progress,
    };
    let vectors = embed_passages(embedder.clone(), &texts, opts).await?;
    ensure!(vectors.len() == chunks.len(), "got {} vectors for {} chunks", vectors.len(), chunks.len());

    let schema = build_chunk_schema(dim);
    let mut batches: Vec<Result<RecordBatch, arrow_schema::ArrowError>> = Vec::new();
    for (cs, vs) in chunks.chunks(WRITE_BATCH).zip(vectors.chunks(WRITE_BATCH)) {
        let ids: Vec<&str> = cs.iter().map(|c| c.id.as_str()).collect();
        batches.push(Ok(to_record_batch(&ids, vs, dim)?));
    }

    std::fs::create_dir_all(dir)?;
    let db = connect(dir.to_string_lossy().as_ref()).execute().await?;
    let reader = RecordBatchIterator::new(batches.into_iter(), schema);
    let table = db.create_table(TABLE_NAME, Box::new(reader)).execute().await?;

    let ann = chunks.len() >= vector.ann_min_rows;
    if ann {
        build_ivfpq_index(&table, &compute_ivfpq_params(chunks.len(), dim)).await?;
    }
    info!(rows = chunks.len(), dim, ann, embedder = embedder.id(), "semantic index written");
    Ok(SemanticBuild { rows: chunks.len(), dim, embedder_id: embedder.id().to_string(), ann })
}
