//! Local embedding and pair-scoring models.
//!
//! `BgeM3Embedder` runs an XLM-RoBERTa encoder (BGE-M3) through candle with
//! masked mean pooling; `CrossEncoder` runs the sequence-classification head
//! of a reranker checkpoint. `FakeEmbedder` is a hashing stand-in selected by
//! `APP_USE_FAKE_EMBEDDINGS=1` or the `fake` provider.

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use xrag_core::config::EmbeddingSpec;
use xrag_core::traits::Embedder;

pub mod cross_encoder;
pub mod device;
pub mod fake;
pub mod pool;
pub mod tokenize;

pub use cross_encoder::CrossEncoder;
pub use fake::FakeEmbedder;
pub use pool::{l2_normalize, masked_mean, masked_mean_l2, relevance_scores};

pub const BGE_M3_DIM: usize = 1024;
const DEFAULT_MAX_LEN: usize = 512;
const DEFAULT_BATCH: usize = 16;

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!("Loading embedding model from {}", model_dir.display());
        let (config, tokenizer) = load_config_and_tokenizer(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bge-m3".to_string());
        info!("Embedding model '{}' loaded (dim={})", model_id, config.hidden_size);
        Ok(Self { model, tokenizer, device, model_id, dim: config.hidden_size, max_len: DEFAULT_MAX_LEN })
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(8);
        self
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, inputs, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if rows.len() != texts.len() {
            bail!("embedding count {} != input count {}", rows.len(), texts.len());
        }
        Ok(rows)
    }
}

impl Embedder for BgeM3Embedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(DEFAULT_BATCH) {
            out.extend(self.embed_chunk(chunk)?);
        }
        debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(out)
    }
}

pub(crate) fn load_config_and_tokenizer(model_dir: &Path) -> Result<(XLMRobertaConfig, Tokenizer)> {
    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
    let config_path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
    let config: XLMRobertaConfig = serde_json::from_str(&raw)?;
    Ok((config, tokenizer))
}

/// Weights from `model.safetensors`, falling back to `pytorch_model.bin`.
pub(crate) fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let pickle = model_dir.join("pytorch_model.bin");
        if !pickle.exists() {
            bail!("No model.safetensors or pytorch_model.bin in {}", model_dir.display());
        }
        candle_core::pickle::read_all(&pickle)?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}

pub fn fake_embeddings_enabled() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the embedder a language is configured with.
pub fn embedder_for_spec(spec: &EmbeddingSpec) -> Result<Arc<dyn Embedder>> {
    match spec.provider.to_lowercase().as_str() {
        "fake" => Ok(Arc::new(FakeEmbedder::with_model(BGE_M3_DIM, &spec.model))),
        "local" if fake_embeddings_enabled() => {
            info!("Using FakeEmbedder for '{}'", spec.model);
            Ok(Arc::new(FakeEmbedder::with_model(BGE_M3_DIM, &spec.model)))
        }
        "local" => Ok(Arc::new(BgeM3Embedder::load(&resolve_model_dir(Some(&spec.model))?)?)),
        other => Err(anyhow!("Unsupported embedding provider '{}'", other)),
    }
}

/// A directory holding `config.json` at `hint`, `models/<hint>` or `../models/<hint>`.
pub fn find_model_dir(hint: &str) -> Option<PathBuf> {
    let expanded = xrag_core::config::expand_path(hint);
    let mut candidates = vec![expanded.clone()];
    if expanded.is_relative() {
        candidates.push(Path::new("models").join(&expanded));
        candidates.push(Path::new("../models").join(&expanded));
    }
    candidates.into_iter().find(|dir| dir.join("config.json").exists())
}

/// Locate a model directory: the hint first (see [`find_model_dir`]), then
/// `APP_MODEL_DIR`, `MODEL_DIR` and the bundled `bge-m3` locations.
pub fn resolve_model_dir(hint: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = hint.and_then(find_model_dir) {
        info!("Using model dir: {}", dir.display());
        return Ok(dir);
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { candidates.push(PathBuf::from(dir)); }
    }
    candidates.push(PathBuf::from("../models/bge-m3"));
    candidates.push(PathBuf::from("models/bge-m3"));

    for dir in candidates {
        if dir.join("config.json").exists() {
            info!("Using model dir: {}", dir.display());
            return Ok(dir);
        }
    }
    warn!("No model directory found for {:?}", hint);
    Err(anyhow!("Could not locate model directory for {}", hint.unwrap_or("bge-m3")))
}
