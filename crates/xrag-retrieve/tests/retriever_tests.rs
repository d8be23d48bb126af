mod common;

use std::sync::Arc;

use common::{init_tracing, retriever, seed, Broken, Fixed};
use xrag_core::error::Error;
use xrag_core::types::MetadataFilter;
use xrag_retrieve::{RetrievalMethod, RetrieveOptions};
use xrag_vector::MemoryStore;

const COLL: &str = "xragg_collection__en__wiki__fixed__paragraph";

fn fox_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    seed(
        &store,
        COLL,
        "wiki",
        &[("d1", 0, "the red fox runs", 1.0), ("d2", 0, "a blue dog", 0.0), ("d3", 0, "red red fox fox", 2.0)],
    );
    store
}

fn close(a: Option<f32>, b: f32) -> bool {
    a.is_some_and(|a| (a - b).abs() < 1e-5)
}

#[test]
fn semantic_returns_store_distances_in_order() {
    init_tracing();
    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let res = r.retrieve(COLL, "anything", RetrievalMethod::Semantic, &RetrieveOptions::with_k(3)).expect("semantic");
    assert_eq!(res.documents(), ["a blue dog", "the red fox runs", "red red fox fox"]);
    assert_eq!(res.distances(), [Some(0.0), Some(1.0), Some(4.0)]);
    let sims: Vec<f32> = res.hits().map(|h| h.similarity()).collect();
    assert_eq!(sims, vec![1.0, 0.5, 0.2]);
}

#[test]
fn keyword_scores_follow_substring_counts() {
    let r = retriever(fox_store(), Arc::new(Broken));
    let res = r.retrieve(COLL, "red fox", RetrievalMethod::Keyword, &RetrieveOptions::with_k(5)).expect("keyword");
    // "red red fox fox": 2 + 2 + phrase 2 = 6; "the red fox runs": 1 + 1 + 2 = 4; "a blue dog": 0, dropped.
    assert_eq!(res.documents(), ["red red fox fox", "the red fox runs"]);
    assert!(close(res.distances()[0], 0.0));
    assert!(close(res.distances()[1], 1.0 / 3.0));
}

#[test]
fn keyword_honors_filter_and_require_all_terms() {
    let r = retriever(fox_store(), Arc::new(Broken));
    let opts = RetrieveOptions { k: 5, require_all_terms: true, ..RetrieveOptions::default() };
    let res = r.retrieve(COLL, "red dog", RetrievalMethod::Keyword, &opts).expect("keyword");
    assert!(res.is_empty());

    let opts = RetrieveOptions { k: 5, filter: Some(MetadataFilter::new().equals("doc_id", "d1")), ..RetrieveOptions::default() };
    let res = r.retrieve(COLL, "red", RetrievalMethod::Keyword, &opts).expect("keyword");
    assert_eq!(res.ids().len(), 1);
    assert_eq!(res.documents(), ["the red fox runs"]);
}

#[test]
fn hybrid_alpha_one_matches_semantic_order() {
    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let semantic = r.retrieve(COLL, "red fox", RetrievalMethod::Semantic, &RetrieveOptions::with_k(3)).expect("semantic");
    let opts = RetrieveOptions { k: 3, alpha: 1.0, ..RetrieveOptions::default() };
    let hybrid = r.retrieve(COLL, "red fox", RetrievalMethod::Hybrid, &opts).expect("hybrid");
    assert_eq!(hybrid.ids(), semantic.ids());
    // Combined score equals the similarity, so the distance round-trips.
    assert!(close(hybrid.distances()[1], 1.0));
}

#[test]
fn hybrid_alpha_zero_ranks_by_keyword_within_candidates() {
    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let opts = RetrieveOptions { k: 3, alpha: 0.0, ..RetrieveOptions::default() };
    let res = r.retrieve(COLL, "red fox", RetrievalMethod::Hybrid, &opts).expect("hybrid");
    assert_eq!(res.documents(), ["red red fox fox", "the red fox runs", "a blue dog"]);
    assert!(close(res.distances()[0], 0.0));
    assert!(close(res.distances()[1], 0.5));
    assert_eq!(res.distances()[2], None);
}

#[test]
fn hybrid_overfetches_before_truncating() {
    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let opts = RetrieveOptions { k: 1, alpha: 0.0, ..RetrieveOptions::default() };
    let res = r.retrieve(COLL, "red fox", RetrievalMethod::Hybrid, &opts).expect("hybrid");
    assert_eq!(res.documents(), ["red red fox fox"]);
}

#[test]
fn hybrid_rejects_alpha_out_of_range() {
    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let opts = RetrieveOptions { k: 3, alpha: 1.5, ..RetrieveOptions::default() };
    assert!(matches!(r.retrieve(COLL, "red", RetrievalMethod::Hybrid, &opts), Err(Error::InvalidConfig(_))));
}

#[test]
fn zero_k_is_empty_without_touching_collaborators() {
    let r = retriever(Arc::new(MemoryStore::new()), Arc::new(Broken));
    for method in [RetrievalMethod::Semantic, RetrievalMethod::Keyword, RetrievalMethod::Hybrid] {
        let res = r.retrieve("missing", "q", method, &RetrieveOptions::with_k(0)).expect("empty");
        assert!(res.is_empty());
    }
}

#[test]
fn collaborator_failures_map_to_typed_errors() {
    let r = retriever(fox_store(), Arc::new(Broken));
    let err = r.retrieve(COLL, "q", RetrievalMethod::Semantic, &RetrieveOptions::default());
    assert!(matches!(err, Err(Error::Embedding(msg)) if msg.contains("provider offline")));

    let r = retriever(fox_store(), Arc::new(Fixed(Vec::new())));
    assert!(matches!(r.retrieve(COLL, "q", RetrievalMethod::Semantic, &RetrieveOptions::default()), Err(Error::Embedding(_))));

    let r = retriever(fox_store(), Arc::new(Fixed(vec![0.0])));
    let err = r.retrieve("xragg_collection__en__missing__fixed__paragraph", "q", RetrievalMethod::Semantic, &RetrieveOptions::default());
    assert!(matches!(err, Err(Error::StoreQuery(_))));
    let err = r.retrieve("missing", "q", RetrievalMethod::Keyword, &RetrieveOptions::default());
    assert!(matches!(err, Err(Error::StoreQuery(_))));
}
