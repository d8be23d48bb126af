mod common;

use std::sync::Arc;

use common::{init_tracing, retriever, seed, Fixed};
use xrag_core::config::RetrievalSettings;
use xrag_core::error::Error;
use xrag_core::traits::VectorStore;
use xrag_core::types::Chunk;
use xrag_retrieve::{MultiCollectionSearch, RetrievalMethod, SearchParams};
use xrag_vector::MemoryStore;

const WIKI: &str = "xragg_collection__en__wiki__bge-m3__paragraph";
const NEWS: &str = "xragg_collection__en__news__cohere__paragraph";
const GERMAN: &str = "xragg_collection__de__wiki__bge-m3__paragraph";

fn setup() -> (Arc<MemoryStore>, MultiCollectionSearch) {
    let store = Arc::new(MemoryStore::new());
    seed(&store, WIKI, "wiki", &[("w", 0, "wiki zero", 0.0), ("w", 1, "wiki one", 1.0), ("shared", 0, "shared text", 2.0)]);
    seed(&store, NEWS, "news", &[("n", 0, "news half", 0.5), ("shared", 0, "shared text", 0.1)]);
    seed(&store, GERMAN, "wiki", &[("g", 0, "deutsch", 0.0)]);
    let settings = RetrievalSettings::default();
    let search = MultiCollectionSearch::new(retriever(Arc::clone(&store), Arc::new(Fixed(vec![0.0]))), &settings);
    (store, search)
}

#[test]
fn language_search_fuses_every_matching_collection() {
    init_tracing();
    let (_store, search) = setup();
    let params = SearchParams { top_k: Some(10), ..SearchParams::new(RetrievalMethod::Semantic, 5) };
    let res = search.search_language("q", "EN", &params).expect("search");
    let docs: Vec<&str> = res.documents().iter().map(String::as_str).collect();
    assert!(!docs.contains(&"deutsch"));
    // "shared text" lives in both collections but survives once.
    assert_eq!(docs.iter().filter(|d| **d == "shared text").count(), 1);
    assert_eq!(res.len(), 4);
    assert_eq!(docs[0], "wiki zero");
}

#[test]
fn top_k_defaults_to_k_and_small_k_still_fetches_per_collection_minimum() {
    let (_store, search) = setup();
    let params = SearchParams::new(RetrievalMethod::Semantic, 2);
    let res = search.search_language("q", "en", &params).expect("search");
    assert_eq!(res.len(), 2);
}

#[test]
fn prefer_source_boosts_matching_rows() {
    let (_store, search) = setup();
    let plain = SearchParams::new(RetrievalMethod::Semantic, 3);
    let res = search.search_language("q", "en", &plain).expect("search");
    assert_eq!(res.documents()[0], "wiki zero");

    let boosted = SearchParams { prefer_source: Some("news".into()), ..plain };
    let res = search.search_language("q", "en", &boosted).expect("search");
    assert_eq!(res.documents()[0], "shared text");
    assert_eq!(res.metadatas()[0].get("source").and_then(|v| v.as_str()), Some("news"));
}

#[test]
fn embedding_search_matches_name_substring() {
    let (_store, search) = setup();
    let params = SearchParams::new(RetrievalMethod::Keyword, 5);
    let res = search.search_embedding("text", Some("cohere"), "en", &params).expect("search");
    assert_eq!(res.documents(), ["shared text"]);
    assert_eq!(res.metadatas()[0].get("source").and_then(|v| v.as_str()), Some("news"));

    let res = search.search_embedding("deutsch", None, "de", &params).expect("search");
    assert_eq!(res.documents(), ["deutsch"]);
}

#[test]
fn failing_collection_is_skipped() {
    let (store, search) = setup();
    let broken = "xragg_collection__en__broken__bge-m3__paragraph";
    store.upsert(broken, &[Chunk::new("b", 0, "two dims", "en", "broken")], &[vec![0.0, 0.0]]).expect("upsert");
    let params = SearchParams::new(RetrievalMethod::Semantic, 10);
    let res = search.search_language("q", "en", &params).expect("search");
    assert_eq!(res.len(), 4);
}

#[test]
fn no_matching_collections_is_empty() {
    let (_store, search) = setup();
    let params = SearchParams::new(RetrievalMethod::Hybrid, 5);
    assert!(search.search_language("q", "fr", &params).expect("search").is_empty());
    assert!(search.search_embedding("q", Some("nomic"), "en", &params).expect("search").is_empty());
}

#[test]
fn invalid_alpha_is_not_swallowed() {
    let (_store, search) = setup();
    let mut params = SearchParams::new(RetrievalMethod::Hybrid, 5);
    params.retrieve.alpha = -0.1;
    assert!(matches!(search.search_language("q", "en", &params), Err(Error::InvalidConfig(_))));
}
