//! Capabilities the engines consume. Implementations live in `xrag-embed`,
//! `xrag-vector` and `xrag-rerank`; tests substitute in-memory doubles.

use crate::types::{Chunk, MetadataFilter, RetrievalResult};

/// Turns texts into vectors. Must return one vector per input, in order.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model behind this embedder.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A collection-addressed vector store. Distances are non-negative and
/// smaller means more similar.
pub trait VectorStore: Send + Sync {
    fn query_by_embedding(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<RetrievalResult>;

    /// Every row of `collection` honoring `filter`. Distances are `None`.
    fn get_all(&self, collection: &str, filter: Option<&MetadataFilter>) -> anyhow::Result<RetrievalResult>;

    /// Insert or replace rows by chunk id, creating the collection on demand.
    fn upsert(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<()>;

    fn list_collections(&self) -> anyhow::Result<Vec<String>>;

    fn delete_collection(&self, collection: &str) -> anyhow::Result<()>;
}

/// Scores `(query, document)` pairs jointly, one score per pair.
pub trait PairScorer: Send + Sync {
    fn model_id(&self) -> &str;
    fn score_pairs(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>>;
}

/// One entry of a listwise reranker's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ListwiseHit {
    pub document: String,
    pub relevance_score: f32,
}

/// Scores a whole batch of documents jointly. Output is sorted by descending
/// `relevance_score` and holds at most `top_n` entries.
pub trait ListwiseReranker: Send + Sync {
    fn model_id(&self) -> &str;
    fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> anyhow::Result<Vec<ListwiseHit>>;
}
