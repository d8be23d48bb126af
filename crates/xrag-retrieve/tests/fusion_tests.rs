use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

use xrag_core::score::distance_to_similarity;
use xrag_core::types::{Hit, Metadata, RetrievalResult};
use xrag_retrieve::{fuse, FusionOptions};

fn meta(doc_id: &str, chunk_index: u32, source: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("doc_id".into(), json!(doc_id));
    m.insert("chunk_index".into(), json!(chunk_index));
    m.insert("source".into(), json!(source));
    m
}

fn hit(id: &str, doc_id: &str, source: &str, distance: Option<f32>) -> Hit {
    Hit { id: id.into(), document: format!("text of {id}"), metadata: meta(doc_id, 0, source), distance }
}

fn result(hits: Vec<Hit>) -> RetrievalResult {
    hits.into_iter().collect()
}

fn close(a: Option<f32>, b: f32) -> bool {
    a.is_some_and(|a| (a - b).abs() < 1e-5)
}

#[test]
fn normalizes_over_the_whole_pool() {
    let res = result(vec![
        hit("a", "a", "wiki", Some(0.0)),
        hit("b", "b", "wiki", Some(1.0)),
        hit("c", "c", "wiki", Some(4.0)),
    ]);
    let fused = fuse(&[res], &FusionOptions::top_k(5));
    assert_eq!(fused.ids(), ["a", "b", "c"]);
    // Similarities [1.0, 0.5, 0.2] normalize to [1.0, 0.375, 0.0].
    assert!(close(fused.distances()[0], 0.0));
    assert!(close(fused.distances()[1], 1.0 / 0.375 - 1.0));
    assert_eq!(fused.distances()[2], None);
}

#[test]
fn degenerate_pool_keeps_raw_similarities() {
    let res = result(vec![hit("a", "a", "wiki", Some(1.0)), hit("b", "b", "wiki", Some(1.0))]);
    let fused = fuse(&[res], &FusionOptions::top_k(5));
    assert_eq!(fused.ids(), ["a", "b"]);
    assert!(close(fused.distances()[0], 1.0));
    assert!(close(fused.distances()[1], 1.0));
}

#[test]
fn source_boost_reorders_and_clamps() {
    let res = result(vec![
        hit("wiki-top", "a", "wiki", Some(0.0)),
        hit("news-mid", "b", "news", Some(1.0)),
        hit("news-low", "c", "news", Some(4.0)),
    ]);
    let opts = FusionOptions { boost: 0.7, ..FusionOptions::top_k(5) }.prefer("news");
    let fused = fuse(&[res], &opts);
    // news-mid: 0.375 + 0.7 = 1.075 -> clamped to 1.0, ties wiki-top and keeps pool order.
    assert_eq!(fused.ids(), ["wiki-top", "news-mid", "news-low"]);
    assert!(close(fused.distances()[1], 0.0));
    assert!(close(fused.distances()[2], 1.0 / 0.7 - 1.0));
}

#[test]
fn duplicates_keep_the_best_scoring_copy() {
    let first = result(vec![hit("a@wiki", "a", "wiki", Some(2.0)), hit("b@wiki", "b", "wiki", Some(0.5))]);
    let second = result(vec![hit("a@news", "a", "news", Some(0.0))]);
    let fused = fuse(&[first, second], &FusionOptions::top_k(10));
    assert_eq!(fused.ids(), ["a@news", "b@wiki"]);
}

#[test]
fn dedup_falls_back_to_checksum_then_text() {
    let mut with_checksum = Metadata::new();
    with_checksum.insert("checksum".into(), json!("abc"));
    let rows = vec![
        Hit { id: "1".into(), document: "x".into(), metadata: with_checksum.clone(), distance: Some(0.0) },
        Hit { id: "2".into(), document: "y".into(), metadata: with_checksum, distance: Some(1.0) },
        Hit { id: "3".into(), document: "  same text ".into(), metadata: Metadata::new(), distance: Some(2.0) },
        Hit { id: "4".into(), document: "same text".into(), metadata: Metadata::new(), distance: Some(3.0) },
    ];
    let fused = fuse(&[result(rows)], &FusionOptions::top_k(10));
    assert_eq!(fused.ids(), ["1", "3"]);
}

#[test]
fn empty_inputs_fuse_to_empty() {
    assert!(fuse(&[], &FusionOptions::default()).is_empty());
    assert!(fuse(&[RetrievalResult::new(), RetrievalResult::new()], &FusionOptions::default()).is_empty());
    let res = result(vec![hit("a", "a", "wiki", Some(0.0))]);
    assert!(fuse(&[res], &FusionOptions::top_k(0)).is_empty());
}

#[test]
fn missing_distances_rank_last() {
    let res = result(vec![hit("none", "a", "wiki", None), hit("far", "b", "wiki", Some(9.0))]);
    let fused = fuse(&[res], &FusionOptions::top_k(5));
    assert_eq!(fused.ids(), ["far", "none"]);
}

fn arb_result() -> impl Strategy<Value = RetrievalResult> {
    prop::collection::vec((0u8..6, 0u32..3, prop::option::weighted(0.9, 0.0f32..20.0)), 0..25).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (doc, chunk, distance))| Hit {
                id: format!("id{i}"),
                document: format!("doc {doc} chunk {chunk}"),
                metadata: meta(&format!("d{doc}"), chunk, if doc % 2 == 0 { "wiki" } else { "news" }),
                distance,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn fused_output_is_aligned_bounded_and_sorted(res in arb_result(), other in arb_result(), top_k in 0usize..30) {
        let opts = FusionOptions::top_k(top_k).prefer("wiki");
        let fused = fuse(&[res.clone(), other.clone()], &opts);
        prop_assert_eq!(fused.ids().len(), fused.documents().len());
        prop_assert_eq!(fused.metadatas().len(), fused.distances().len());
        prop_assert_eq!(fused.ids().len(), fused.len());

        let distinct: HashSet<_> = res.hits().chain(other.hits()).map(|h| h.dedup_key()).collect();
        prop_assert!(fused.len() <= top_k);
        prop_assert!(fused.len() <= distinct.len());

        let keys: HashSet<_> = fused.hits().map(|h| h.dedup_key()).collect();
        prop_assert_eq!(keys.len(), fused.len());

        let scores: Vec<f32> = fused.distances().iter().map(|d| distance_to_similarity(*d)).collect();
        prop_assert!(scores.windows(2).all(|w| w[0] + 1e-4 >= w[1]));
    }

    #[test]
    fn fusing_a_result_with_itself_changes_nothing(res in arb_result(), top_k in 0usize..30) {
        let opts = FusionOptions::top_k(top_k);
        let once = fuse(std::slice::from_ref(&res), &opts);
        let twice = fuse(&[res.clone(), res], &opts);
        prop_assert_eq!(once.ids(), twice.ids());
    }
}
