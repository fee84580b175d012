use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vaultdb_core::settings::{EmbeddingSettings, VectorSettings};
use vaultdb_core::traits::Embedder;
use vaultdb_core::{Chunk, SourceKind};
use vaultdb_embed::testing::{FailingEmbedder, OneHotEmbedder, WrongDimEmbedder};
use vaultdb_embed::HashEmbedder;
use vaultdb_vector::{build_semantic_index, embed_query, SemanticIndex};

fn chunk(path: &str, text: &str) -> Chunk {
    Chunk {
        id: Chunk::make_id(path, 0),
        note_path: path.to_string(),
        title: path.trim_end_matches(".md").to_string(),
        header: None,
        text: text.to_string(),
        position: 0,
        total: 1,
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("bandits.md", "Thompson sampling for bandits"),
        chunk("cooking.md", "Roasting vegetables slowly"),
        chunk("rag.md", "Retrieval augmented generation"),
    ]
}

#[tokio::test]
async fn one_hot_query_finds_known_chunk_first() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let embedder: Arc<dyn Embedder> = Arc::new(OneHotEmbedder::new(&["bandit", "roast", "retrieval"]));
    let build = build_semantic_index(
        tmp.path(),
        &corpus(),
        embedder.clone(),
        &EmbeddingSettings::default(),
        &VectorSettings::default(),
        false,
    )
    .await?;
    assert_eq!((build.rows, build.dim, build.ann), (3, 4, false));
    assert_eq!(build.embedder_id, "one-hot");

    let index = SemanticIndex::open(tmp.path(), build.dim).await?;
    assert_eq!(index.len(), 3);
    assert_eq!(index.chunk_ids().await?, vec!["bandits.md#0", "cooking.md#0", "rag.md#0"]);

    let q = embed_query(embedder, "which retrieval methods exist").await?;
    let hits = index.search_vec(&q, 3).await?;
    assert_eq!(hits[0].id, "rag.md#0");
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert_eq!(hits[0].source, SourceKind::Semantic);
    // the other two are orthogonal: equal scores, ordered by id
    assert_eq!(hits[1].id, "bandits.md#0");
    assert_eq!(hits[2].id, "cooking.md#0");
    Ok(())
}

#[tokio::test]
async fn wrong_query_dimension_is_an_error() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let settings = EmbeddingSettings { batch_size: 2, ..EmbeddingSettings::default() };
    build_semantic_index(tmp.path(), &corpus(), embedder, &settings, &VectorSettings::default(), false).await?;
    let index = SemanticIndex::open(tmp.path(), 16).await?;
    assert!(index.search_vec(&[0.0; 8], 3).await.is_err());
    assert!(index.search_vec(&[0.1; 16], 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn bad_embedder_output_fails_the_build() {
    let tmp = TempDir::new().unwrap();
    let wrong: Arc<dyn Embedder> = Arc::new(WrongDimEmbedder { dim: 8 });
    let err = build_semantic_index(
        tmp.path(),
        &corpus(),
        wrong,
        &EmbeddingSettings::default(),
        &VectorSettings::default(),
        false,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("dim mismatch"), "{err}");

    let failing: Arc<dyn Embedder> = Arc::new(FailingEmbedder { dim: 8, delay: Duration::ZERO });
    assert!(build_semantic_index(
        &tmp.path().join("other"),
        &corpus(),
        failing,
        &EmbeddingSettings::default(),
        &VectorSettings::default(),
        false,
    )
    .await
    .is_err());
}
