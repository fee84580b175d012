use vaultdb_core::settings::EmbeddingSettings;
use vaultdb_core::EmbedKind;
use vaultdb_embed::get_default_embedder;

#[test]
fn hash_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { dim: 128, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 128);

    let texts = vec!["hello world".to_string(), "hello world".to_string(), "other text".to_string()];
    let embs = embedder.embed_batch(&texts, EmbedKind::Passage).expect("embed_batch");
    assert_eq!(embs.len(), 3);
    assert!(embs.iter().all(|v| v.len() == 128));

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(embs[0], embs[1]);
    assert_ne!(embs[0], embs[2]);
}

#[test]
fn batch_does_not_change_a_text_vector() {
    let embedder = get_default_embedder(&EmbeddingSettings::default()).expect("embedder");
    let alone = embedder.embed_batch(&["bandits".to_string()], EmbedKind::Query).unwrap();
    let mixed = embedder
        .embed_batch(&["x y z".to_string(), "bandits".to_string()], EmbedKind::Query)
        .unwrap();
    assert_eq!(alone[0], mixed[1]);
}
