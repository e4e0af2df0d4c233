use docrag_core::config::RagSettings;
use docrag_core::traits::Embedder;
use docrag_embed::{get_default_embedder, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    // Force fake embedder to avoid loading the model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let settings = RagSettings::default();
    let embedder = get_default_embedder(&settings, std::path::Path::new(".")).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(embedder.dim(), 384);
    assert_eq!(v1.len(), 384, "embedding dim follows settings");

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Deterministic for same input
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_words_score_higher() {
    let embedder = HashEmbedder::new(256);
    let texts: Vec<String> = ["private area of the unit", "area of the private unit", "weather forecast tomorrow"]
        .iter().map(|s| s.to_string()).collect();
    let embs = embedder.embed_batch(&texts).expect("embed");
    assert!(cosine(&embs[0], &embs[1]) > cosine(&embs[0], &embs[2]));
}

#[test]
fn blank_text_still_has_unit_norm() {
    let embedder = HashEmbedder::new(16);
    let embs = embedder.embed_batch(&["   ".to_string()]).expect("embed");
    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-6);
}
