use anyhow::Result;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use xrag_core::traits::PairScorer;

use crate::{device, load_config_and_tokenizer, load_var_builder, pool, tokenize};

/// Sequence-classification reranker (e.g. bge-reranker-v2-m3). Each
/// `(query, document)` pair is encoded jointly; the single logit goes through
/// a sigmoid so scores land in `[0, 1]`.
pub struct CrossEncoder {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    max_len: usize,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!("Loading cross-encoder from {}", model_dir.display());
        let (config, tokenizer) = load_config_and_tokenizer(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cross-encoder".to_string());
        Ok(Self { model, tokenizer, device, model_id, max_len: max_len.max(8) })
    }
}

impl PairScorer for CrossEncoder {
    fn model_id(&self) -> &str { &self.model_id }

    fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let inputs: Vec<(&str, &str)> = pairs.iter().map(|(q, d)| (q.as_str(), d.as_str())).collect();
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, inputs, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
        let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
        let scores = pool::relevance_scores(&logits, pairs.len())?;
        debug!("Scored {} pairs in {:?}", pairs.len(), start.elapsed());
        Ok(scores)
    }
}
