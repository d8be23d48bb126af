#![allow(dead_code)]

use std::sync::Arc;

use xrag_core::registry::EmbedderRegistry;
use xrag_core::traits::{Embedder, VectorStore};
use xrag_core::types::Chunk;
use xrag_retrieve::CollectionRetriever;
use xrag_vector::MemoryStore;

/// Embeds every text to the same vector.
pub struct Fixed(pub Vec<f32>);

impl Embedder for Fixed {
    fn model_id(&self) -> &str { "fixed" }
    fn dim(&self) -> usize { self.0.len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.0.clone()).collect())
    }
}

/// Always fails.
pub struct Broken;

impl Embedder for Broken {
    fn model_id(&self) -> &str { "broken" }
    fn dim(&self) -> usize { 1 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("provider offline")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Store `(doc_id, chunk_index, text, 1-d position)` rows into `collection`.
pub fn seed(store: &MemoryStore, collection: &str, source: &str, rows: &[(&str, usize, &str, f32)]) {
    let chunks: Vec<Chunk> = rows.iter().map(|(d, i, t, _)| Chunk::new(*d, *i, *t, "en", source)).collect();
    let embeddings: Vec<Vec<f32>> = rows.iter().map(|(_, _, _, p)| vec![*p]).collect();
    store.upsert(collection, &chunks, &embeddings).expect("seed");
}

pub fn retriever(store: Arc<MemoryStore>, embedder: Arc<dyn Embedder>) -> CollectionRetriever {
    CollectionRetriever::new(store, EmbedderRegistry::new().with_default(embedder))
}
