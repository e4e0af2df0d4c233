use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, DType, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docrag_core::config::RagSettings;
use docrag_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch_on_device;

const DEFAULT_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";
const MAX_TOKENS: usize = 256;
const BATCH_SIZE: usize = 32;

/// BERT-family sentence embedder (MiniLM by default): masked mean pooling
/// over the last hidden state, then L2 normalization.
pub struct SentenceEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize, pad_id: u32 }

impl SentenceEmbedder {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading sentence embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)?;
        let config: BertConfig = serde_json::from_str(&config_text)?;
        let raw: serde_json::Value = serde_json::from_str(&config_text)?;
        let dim = raw.get("hidden_size").and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
        let max_positions = raw.get("max_position_embeddings").and_then(serde_json::Value::as_u64).unwrap_or(512) as usize;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let pad_id = tokenizer.token_to_id("[PAD]").or_else(|| tokenizer.token_to_id("<pad>")).unwrap_or(0);
        info!(dim, "sentence embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len: MAX_TOKENS.min(max_positions), pad_id })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize_batch_on_device(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?)
    }
}

impl Embedder for SentenceEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) { out.extend(self.embed_chunk(batch)?); }
        if start.elapsed().as_millis() > 100 * texts.len().max(1) as u128 { warn!(count = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding batch"); }
        Ok(out)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "reading safetensors weights");
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        debug!(path = %pickle.display(), "reading pytorch weights");
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("No model weights (model.safetensors or pytorch_model.bin) in {}", model_dir.display()))
}

/// Deterministic bag-of-words embedder: every whitespace token is hashed into
/// one of `dim` buckets. Texts that share words get similar vectors, which is
/// all tests and offline development need.
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        // blank input still maps to a unit vector
        if v.iter().all(|x| *x == 0.0) { v[0] = 1.0; }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_one(t)).collect()) }
}

/// Pick the embedder for the given settings.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` selects the [`HashEmbedder`]; otherwise the
/// sentence model is loaded from the resolved model directory.
pub fn get_default_embedder(settings: &RagSettings, base_dir: &Path) -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake { info!(dim = settings.dimension, "using hash embedder"); return Ok(Box::new(HashEmbedder::new(settings.dimension))); }
    let model_dir = resolve_model_dir(settings.model_dir_in(base_dir))?;
    Ok(Box::new(SentenceEmbedder::new(&model_dir)?))
}

fn resolve_model_dir(configured: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = configured { if p.exists() { return Ok(p); } warn!(path = %p.display(), "configured model_dir does not exist"); }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { debug!(var, path = %p.display(), "model dir from env"); return Ok(p); } }
    }
    for candidate in [Path::new("models").join(DEFAULT_MODEL_NAME), Path::new("../models").join(DEFAULT_MODEL_NAME)] {
        if candidate.exists() { return Ok(candidate); }
    }
    Err(anyhow!("Could not locate the {} model directory", DEFAULT_MODEL_NAME))
}
