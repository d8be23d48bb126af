//! Model heads: how encoder outputs become vectors or relevance scores.
//!
//! The embedder pools token states into one unit vector per text; the
//! cross-encoder squashes one logit per pair into `[0, 1]`.

use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};

fn norm_eps(dtype: DType) -> f64 {
    match dtype {
        DType::F16 | DType::BF16 => 1e-6,
        _ => 1e-12,
    }
}

/// Average of the token states the attention mask keeps: `[B,T,H]` -> `[B,H]`.
/// Rows whose mask is all zeros pool to zeros.
pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, tokens, _) = match hidden.dims() {
        [b, t, h] => (*b, *t, *h),
        other => bail!("hidden states must be [batch, tokens, hidden], got {:?}", other),
    };
    if attention_mask.dims() != [batch, tokens] {
        bail!("attention mask {:?} does not match hidden states [{batch}, {tokens}, _]", attention_mask.dims());
    }
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let kept = mask.sum_keepdim(1)?.maximum(1.0)?;
    Ok(summed.broadcast_div(&kept)?)
}

/// Scale every row of a `[B,H]` tensor to unit length.
pub fn l2_normalize(rows: &Tensor) -> Result<Tensor> {
    let norms = rows.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, norm_eps(rows.dtype()))?;
    Ok(rows.broadcast_div(&norms)?)
}

/// Sentence embeddings from encoder output.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    l2_normalize(&masked_mean(hidden, attention_mask)?)
}

/// Sigmoid of a single-label classifier's logits (`[B,1]` or `[B]`), one
/// score per pair.
pub fn relevance_scores(logits: &Tensor, pairs: usize) -> Result<Vec<f32>> {
    let scores = candle_nn::ops::sigmoid(logits)?
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    if scores.len() != pairs {
        bail!("classifier returned {} scores for {} pairs", scores.len(), pairs);
    }
    Ok(scores)
}
