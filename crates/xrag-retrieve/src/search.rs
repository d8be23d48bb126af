//! Fan a query out over every matching collection and fuse the results.

use tracing::{debug, warn};

use xrag_core::collection::{collections_with_prefix, CollectionName};
use xrag_core::config::RetrievalSettings;
use xrag_core::error::{Error, Result};
use xrag_core::types::RetrievalResult;

use crate::fusion::{fuse, FusionOptions};
use crate::retriever::{CollectionRetriever, RetrievalMethod, RetrieveOptions};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub method: RetrievalMethod,
    pub retrieve: RetrieveOptions,
    pub prefer_source: Option<String>,
    /// Size of the fused list; defaults to `retrieve.k`.
    pub top_k: Option<usize>,
}

impl SearchParams {
    pub fn new(method: RetrievalMethod, k: usize) -> Self {
        Self { method, retrieve: RetrieveOptions::with_k(k), ..Self::default() }
    }
}

pub struct MultiCollectionSearch {
    retriever: CollectionRetriever,
    prefix: String,
    min_per_collection_k: usize,
    boost: f32,
}

impl MultiCollectionSearch {
    pub fn new(retriever: CollectionRetriever, settings: &RetrievalSettings) -> Self {
        Self {
            retriever,
            prefix: settings.collection_prefix.clone(),
            min_per_collection_k: settings.min_per_collection_k,
            boost: settings.source_boost,
        }
    }

    pub fn retriever(&self) -> &CollectionRetriever {
        &self.retriever
    }

    /// Search every collection of `language`.
    pub fn search_language(&self, query: &str, language: &str, params: &SearchParams) -> Result<RetrievalResult> {
        let names = self.list()?;
        let prefix = CollectionName::language_prefix(&self.prefix, language);
        let targets: Vec<&str> = collections_with_prefix(&names, &prefix);
        self.search_collections(&targets, query, params)
    }

    /// Search every collection whose name contains `embedding`; without one,
    /// fall back to the collections of `language`.
    pub fn search_embedding(&self, query: &str, embedding: Option<&str>, language: &str, params: &SearchParams) -> Result<RetrievalResult> {
        match embedding.filter(|e| !e.is_empty()) {
            Some(needle) => {
                let names = self.list()?;
                let targets: Vec<&str> = names.iter().map(String::as_str).filter(|n| n.contains(needle)).collect();
                self.search_collections(&targets, query, params)
            }
            None => self.search_language(query, language, params),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        self.retriever.store().list_collections().map_err(|e| Error::store(&e))
    }

    fn search_collections(&self, collections: &[&str], query: &str, params: &SearchParams) -> Result<RetrievalResult> {
        if params.method == RetrievalMethod::Hybrid && !(0.0..=1.0).contains(&params.retrieve.alpha) {
            return Err(Error::InvalidConfig(format!("hybrid alpha must be in [0, 1], got {}", params.retrieve.alpha)));
        }
        if collections.is_empty() {
            debug!("no collections matched");
            return Ok(RetrievalResult::new());
        }
        let per_collection = RetrieveOptions {
            k: params.retrieve.k.max(self.min_per_collection_k),
            ..params.retrieve.clone()
        };
        let mut pool = Vec::with_capacity(collections.len());
        for collection in collections {
            match self.retriever.retrieve(collection, query, params.method, &per_collection) {
                Ok(res) => pool.push(res),
                Err(e) => warn!(collection = %collection, error = %e, "retrieval failed, skipping collection"),
            }
        }
        let fusion = FusionOptions {
            prefer_source: params.prefer_source.clone(),
            boost: self.boost,
            top_k: params.top_k.unwrap_or(params.retrieve.k),
        };
        Ok(fuse(&pool, &fusion))
    }
}
