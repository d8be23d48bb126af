//! Merge ranked lists from many collections into one deduplicated top-k.
//!
//! Pipeline: flatten every input into one pool, turn distances into
//! similarities, min-max normalize over the whole pool, add the source boost
//! (clamped to 1.0), keep the best item per [`DedupKey`], truncate, and
//! convert scores back to approximate distances.

use std::collections::HashSet;
use tracing::debug;

use xrag_core::config::RetrievalSettings;
use xrag_core::score::{min_max_normalize, similarity_to_distance};
use xrag_core::types::{DedupKey, Hit, RetrievalResult};

pub const DEFAULT_SOURCE_BOOST: f32 = 0.18;

#[derive(Debug, Clone, PartialEq)]
pub struct FusionOptions {
    /// Boost items whose metadata `source` equals this value.
    pub prefer_source: Option<String>,
    pub boost: f32,
    pub top_k: usize,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self { prefer_source: None, boost: DEFAULT_SOURCE_BOOST, top_k: 5 }
    }
}

impl FusionOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self { top_k, ..Self::default() }
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self { prefer_source: None, boost: settings.source_boost, top_k: settings.default_k }
    }

    #[must_use]
    pub fn prefer(mut self, source: impl Into<String>) -> Self {
        self.prefer_source = Some(source.into());
        self
    }
}

struct ScoredItem {
    hit: Hit,
    score: f32,
}

pub fn fuse(results: &[RetrievalResult], opts: &FusionOptions) -> RetrievalResult {
    let hits: Vec<Hit> = results.iter().flat_map(RetrievalResult::hits).collect();
    if hits.is_empty() || opts.top_k == 0 {
        return RetrievalResult::new();
    }

    let mut scores: Vec<f32> = hits.iter().map(Hit::similarity).collect();
    min_max_normalize(&mut scores);

    let mut pool: Vec<ScoredItem> = hits
        .into_iter()
        .zip(scores)
        .map(|(hit, norm)| {
            let boosted = match &opts.prefer_source {
                Some(src) if hit.metadata.get("source").and_then(|v| v.as_str()) == Some(src.as_str()) => norm + opts.boost,
                _ => norm,
            };
            ScoredItem { hit, score: boosted.min(1.0) }
        })
        .collect();
    let pool_size = pool.len();

    pool.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut out = RetrievalResult::with_capacity(opts.top_k.min(pool_size));
    for item in pool {
        if out.len() >= opts.top_k {
            break;
        }
        if !seen.insert(item.hit.dedup_key()) {
            continue;
        }
        out.push(Hit { distance: similarity_to_distance(item.score), ..item.hit });
    }
    debug!(inputs = results.len(), pool = pool_size, kept = out.len(), "fused results");
    out
}
