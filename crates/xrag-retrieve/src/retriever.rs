//! Single-collection retrieval: semantic, keyword and hybrid.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use xrag_core::collection::CollectionName;
use xrag_core::error::{Error, Result};
use xrag_core::registry::EmbedderRegistry;
use xrag_core::score::similarity_to_distance;
use xrag_core::traits::{Embedder, VectorStore};
use xrag_core::types::{Hit, MetadataFilter, RetrievalResult};

use crate::keyword::KeywordQuery;

/// Semantic candidates fetched per requested hybrid result.
pub const HYBRID_OVERFETCH: usize = 3;
pub const DEFAULT_ALPHA: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    #[default]
    Semantic,
    Keyword,
    Hybrid,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        })
    }
}

impl FromStr for RetrievalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(Error::UnknownMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub k: usize,
    pub filter: Option<MetadataFilter>,
    /// Keyword only: drop texts missing any query token.
    pub require_all_terms: bool,
    /// Hybrid only: weight of the semantic similarity.
    pub alpha: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self { k: 5, filter: None, require_all_terms: false, alpha: DEFAULT_ALPHA }
    }
}

impl RetrieveOptions {
    pub fn with_k(k: usize) -> Self {
        Self { k, ..Self::default() }
    }
}

/// Runs one retrieval strategy against one named collection.
#[derive(Clone)]
pub struct CollectionRetriever {
    store: Arc<dyn VectorStore>,
    embedders: EmbedderRegistry,
}

impl CollectionRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedders: EmbedderRegistry) -> Self {
        Self { store, embedders }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn retrieve(&self, collection: &str, query: &str, method: RetrievalMethod, opts: &RetrieveOptions) -> Result<RetrievalResult> {
        let filter = opts.filter.as_ref();
        match method {
            RetrievalMethod::Semantic => self.retrieve_semantic(collection, query, opts.k, filter),
            RetrievalMethod::Keyword => self.retrieve_keyword(collection, query, opts.k, filter, opts.require_all_terms),
            RetrievalMethod::Hybrid => self.retrieve_hybrid(collection, query, opts.k, filter, opts.alpha),
        }
    }

    pub fn retrieve_semantic(&self, collection: &str, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::new());
        }
        let embedder = self.embedder_for(collection)?;
        let query_vec = embed_query(embedder.as_ref(), query)?;
        let res = self
            .store
            .query_by_embedding(collection, &query_vec, k, filter)
            .map_err(|e| Error::store(&e))?;
        debug!(collection = %collection, hits = res.len(), "semantic retrieval");
        Ok(res)
    }

    pub fn retrieve_keyword(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        require_all_terms: bool,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::new());
        }
        let rows = self.store.get_all(collection, filter).map_err(|e| Error::store(&e))?;
        let q = KeywordQuery::parse(query);

        let mut scored: Vec<(u32, Hit)> = rows
            .into_hits()
            .into_iter()
            .filter_map(|hit| match q.score(&hit.document, require_all_terms) {
                Some(s) if s > 0 => Some((s, hit)),
                _ => None,
            })
            .collect();
        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let max_score = scored.first().map_or(1, |(s, _)| *s) as f32;
        debug!(collection = %collection, matches = scored.len(), "keyword retrieval");

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(s, hit)| Hit { distance: Some(1.0 - s as f32 / max_score), ..hit })
            .collect())
    }

    pub fn retrieve_hybrid(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        alpha: f32,
    ) -> Result<RetrievalResult> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidConfig(format!("hybrid alpha must be in [0, 1], got {alpha}")));
        }
        if k == 0 {
            return Ok(RetrievalResult::new());
        }
        let candidates = self.retrieve_semantic(collection, query, (k * HYBRID_OVERFETCH).max(k), filter)?;
        let n = candidates.len();
        let q = KeywordQuery::parse(query);

        let hits = candidates.into_hits();
        let keyword: Vec<u32> = hits.iter().map(|h| q.score(&h.document, false).unwrap_or(0)).collect();
        let max_kw = keyword.iter().copied().max().unwrap_or(0);

        let mut combined: Vec<(f32, Hit)> = hits
            .into_iter()
            .zip(keyword)
            .enumerate()
            .map(|(rank, (hit, kw))| {
                let sem = match hit.distance {
                    Some(_) => hit.similarity(),
                    None => 1.0 - rank as f32 / (n.saturating_sub(1).max(1)) as f32,
                };
                let kw_norm = if max_kw == 0 { 0.0 } else { kw as f32 / max_kw as f32 };
                (alpha * sem + (1.0 - alpha) * kw_norm, hit)
            })
            .collect();
        combined.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        debug!(collection = %collection, candidates = n, alpha, "hybrid retrieval");

        Ok(combined
            .into_iter()
            .take(k)
            .map(|(score, hit)| Hit { distance: similarity_to_distance(score), ..hit })
            .collect())
    }

    /// Embedder for the language encoded in the collection name, or the
    /// registry default for names that do not parse.
    fn embedder_for(&self, collection: &str) -> Result<Arc<dyn Embedder>> {
        let language = CollectionName::parse(collection).map(|c| c.language).unwrap_or_default();
        self.embedders.for_language(&language)
    }
}

fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed_batch(&[query.to_string()]).map_err(|e| Error::embedding(&e))?;
    match vectors.pop() {
        Some(v) if !v.is_empty() && vectors.is_empty() => Ok(v),
        _ => Err(Error::Embedding(format!("'{}' returned no embedding for the query", embedder.model_id()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("Hybrid".parse::<RetrievalMethod>().ok(), Some(RetrievalMethod::Hybrid));
        assert_eq!(" keyword ".parse::<RetrievalMethod>().ok(), Some(RetrievalMethod::Keyword));
        assert!(matches!("bm25".parse::<RetrievalMethod>(), Err(Error::UnknownMethod(m)) if m == "bm25"));
        assert_eq!(RetrievalMethod::default().to_string(), "semantic");
    }
}
