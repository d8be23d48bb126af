//! Scoring backends and how they are built.

use anyhow::{anyhow, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

use xrag_core::config::{BackendKind, RerankerSettings};
use xrag_core::error::Error;
use xrag_core::score::cosine_similarity;
use xrag_core::traits::{Embedder, ListwiseHit, ListwiseReranker, PairScorer};
use xrag_embed::{
    fake_embeddings_enabled, find_model_dir, resolve_model_dir, BgeM3Embedder, CrossEncoder, FakeEmbedder, BGE_M3_DIM,
};

use crate::http::HttpListwiseReranker;

/// A loaded backend. Every variant returns one score per input text, in input order.
pub enum ScoringBackend {
    Pairwise { scorer: Box<dyn PairScorer>, batch_size: usize },
    Embedding { embedder: Arc<dyn Embedder>, batch_size: usize },
    Listwise { reranker: Box<dyn ListwiseReranker>, max_docs: usize },
}

impl ScoringBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Pairwise { .. } => BackendKind::Pairwise,
            Self::Embedding { .. } => BackendKind::Embedding,
            Self::Listwise { .. } => BackendKind::Listwise,
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            Self::Pairwise { scorer, .. } => scorer.model_id(),
            Self::Embedding { embedder, .. } => embedder.model_id(),
            Self::Listwise { reranker, .. } => reranker.model_id(),
        }
    }

    /// Failed pairwise or listwise batches score as zeros; embedding
    /// failures are returned as [`Error::Embedding`].
    pub fn score(&self, query: &str, texts: &[String]) -> xrag_core::Result<Vec<f32>> {
        match self {
            Self::Pairwise { scorer, batch_size } => Ok(score_pairwise(scorer.as_ref(), query, texts, *batch_size)),
            Self::Embedding { embedder, batch_size } => score_embedding(embedder.as_ref(), query, texts, *batch_size),
            Self::Listwise { reranker, max_docs } => Ok(score_listwise(reranker.as_ref(), query, texts, *max_docs)),
        }
    }
}

fn score_pairwise(scorer: &dyn PairScorer, query: &str, texts: &[String], batch_size: usize) -> Vec<f32> {
    let mut scores = vec![0.0f32; texts.len()];
    let batch_size = batch_size.max(1);
    for (batch, start) in (0..texts.len()).step_by(batch_size).enumerate() {
        let end = (start + batch_size).min(texts.len());
        let pairs: Vec<(String, String)> = texts[start..end].iter().map(|t| (query.to_string(), t.clone())).collect();
        match scorer.score_pairs(&pairs) {
            Ok(batch_scores) if batch_scores.len() == pairs.len() => {
                scores[start..end].copy_from_slice(&batch_scores);
            }
            Ok(batch_scores) => {
                warn!(batch, expected = pairs.len(), got = batch_scores.len(), "Pairwise batch returned wrong score count; scoring as zeros");
            }
            Err(e) => warn!(batch, "Pairwise batch failed, scoring as zeros: {e:#}"),
        }
    }
    scores
}

fn score_embedding(embedder: &dyn Embedder, query: &str, texts: &[String], batch_size: usize) -> xrag_core::Result<Vec<f32>> {
    let query_vec = embedder
        .embed_batch(&[query.to_string()])
        .map_err(|e| Error::embedding(&e))?
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Embedding("embedder returned no query vector".into()))?;

    let mut scores = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed_batch(batch).map_err(|e| Error::embedding(&e))?;
        if vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "embedding backend '{}' returned {} vectors for {} documents",
                embedder.model_id(),
                vectors.len(),
                batch.len()
            )));
        }
        scores.extend(vectors.iter().map(|v| (cosine_similarity(&query_vec, v) + 1.0) / 2.0));
    }
    Ok(scores)
}

fn score_listwise(reranker: &dyn ListwiseReranker, query: &str, texts: &[String], max_docs: usize) -> Vec<f32> {
    let mut scores = vec![0.0f32; texts.len()];
    let max_docs = max_docs.max(1);
    for (batch, start) in (0..texts.len()).step_by(max_docs).enumerate() {
        let end = (start + max_docs).min(texts.len());
        let chunk = &texts[start..end];
        match reranker.rerank(query, chunk, chunk.len()) {
            Ok(hits) => assign_listwise_scores(chunk, &hits, &mut scores[start..end]),
            Err(e) => warn!(batch, "Listwise batch failed, scoring as zeros: {e:#}"),
        }
    }
    scores
}

/// Writes each hit's score into the next unused position holding the same
/// text, so N identical texts receive the N scores emitted for that text.
/// Hits whose text has no free position left are ignored.
pub fn assign_listwise_scores(batch: &[String], hits: &[ListwiseHit], scores: &mut [f32]) {
    let mut positions: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (i, text) in batch.iter().enumerate() {
        positions.entry(text.as_str()).or_default().push_back(i);
    }
    for hit in hits {
        if let Some(i) = positions.get_mut(hit.document.as_str()).and_then(VecDeque::pop_front) {
            scores[i] = hit.relevance_score;
        }
    }
}

/// Builds the backend for a [`BackendKind`]. Any closure of the right shape is a loader.
pub trait BackendLoader: Send + Sync {
    fn load(&self, kind: BackendKind) -> Result<ScoringBackend>;
}

impl<F> BackendLoader for F
where
    F: Fn(BackendKind) -> Result<ScoringBackend> + Send + Sync,
{
    fn load(&self, kind: BackendKind) -> Result<ScoringBackend> {
        self(kind)
    }
}

/// Loads real models and clients as described by [`RerankerSettings`].
pub struct ModelBackendLoader {
    settings: RerankerSettings,
}

impl ModelBackendLoader {
    pub fn new(settings: RerankerSettings) -> Self {
        Self { settings }
    }
}

impl BackendLoader for ModelBackendLoader {
    fn load(&self, kind: BackendKind) -> Result<ScoringBackend> {
        let s = &self.settings;
        match kind {
            BackendKind::Listwise => {
                let reranker = HttpListwiseReranker::from_settings(s)?;
                info!("Listwise reranker ready: {} at {}", s.listwise_model, s.listwise_url);
                Ok(ScoringBackend::Listwise { reranker: Box::new(reranker), max_docs: s.listwise_max_docs })
            }
            BackendKind::Pairwise => {
                let dir = find_model_dir(&s.cross_encoder_model)
                    .ok_or_else(|| anyhow!("cross-encoder model not found: {}", s.cross_encoder_model))?;
                let scorer = CrossEncoder::load(&dir, s.max_length)?;
                info!("Cross-encoder ready from {}", dir.display());
                Ok(ScoringBackend::Pairwise { scorer: Box::new(scorer), batch_size: s.batch_size })
            }
            BackendKind::Embedding => {
                let embedder: Arc<dyn Embedder> = if fake_embeddings_enabled() {
                    Arc::new(FakeEmbedder::new(BGE_M3_DIM))
                } else {
                    let dir = resolve_model_dir(Some(&s.mono_encoder_model))?;
                    Arc::new(BgeM3Embedder::load(&dir)?.with_max_len(s.max_length))
                };
                info!("Embedding reranker ready: {}", embedder.model_id());
                Ok(ScoringBackend::Embedding { embedder, batch_size: s.batch_size })
            }
        }
    }
}
