//! Index a few chunks, search every English collection, then rerank.
//!
//! Run without model weights: `APP_USE_FAKE_EMBEDDINGS=1 cargo run -p xrag-rerank --example pipeline`

use std::sync::Arc;

use xrag_core::config::Config;
use xrag_core::registry::EmbedderRegistry;
use xrag_core::types::{Document, Metadata};
use xrag_embed::embedder_for_spec;
use xrag_rerank::RerankingEngine;
use xrag_retrieve::{CollectionRetriever, MultiCollectionSearch, RetrievalMethod, SearchParams};
use xrag_vector::{ChunkIndexer, MemoryStore, SourceDocument};

fn doc(id: &str, source: &str, chunks: &[&str]) -> SourceDocument {
    SourceDocument {
        doc_id: id.to_string(),
        language: "en".to_string(),
        source: source.to_string(),
        chunks: chunks.iter().map(|c| ((*c).to_string(), Metadata::new())).collect(),
        ..SourceDocument::default()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let settings = Config::load()?.settings()?;

    let store = Arc::new(MemoryStore::new());
    let embedders = EmbedderRegistry::from_settings(&settings.retrieval, embedder_for_spec)?;
    let indexer = ChunkIndexer::new(store.clone(), embedders.clone(), settings.retrieval.collection_prefix.clone(), settings.indexer.clone())
        .with_progress(true);
    let report = indexer.index(&[
        doc("well", "wiki", &["hand pump for a shallow well", "well water testing for nitrates"]),
        doc("solar", "forum", &["sizing a solar battery bank", "hand pump repair kit"]),
    ])?;
    println!("indexed={} skipped={}", report.indexed, report.skipped);

    let search = MultiCollectionSearch::new(CollectionRetriever::new(store, embedders), &settings.retrieval);
    let query = "repairing a hand pump";
    let params = SearchParams { prefer_source: Some("wiki".into()), ..SearchParams::new(RetrievalMethod::Hybrid, 4) };
    let fused = search.search_language(query, "en", &params)?;

    let mut engine = RerankingEngine::new(settings.reranker);
    let ranked = engine.rerank(query, &Document::from_result(&fused), Some(3))?;
    println!("backend={:?}", engine.backend_kind());
    for d in &ranked {
        println!("{:.3}  {}", d.score().unwrap_or_default(), d.text());
    }
    Ok(())
}
