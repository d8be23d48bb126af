//! Writes already-chunked documents into per-language, per-source collections.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use xrag_core::collection::CollectionName;
use xrag_core::config::IndexerSettings;
use xrag_core::error::{Error, Result};
use xrag_core::registry::EmbedderRegistry;
use xrag_core::traits::VectorStore;
use xrag_core::types::{Chunk, ChunkId, Metadata};

/// A document as produced by the external chunker.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub doc_id: String,
    pub language: String,
    pub source: String,
    pub title: Option<String>,
    pub url: Option<String>,
    /// `(text, chunker metadata)` in document order.
    pub chunks: Vec<(String, Metadata)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub upserted_ids: Vec<ChunkId>,
}

pub struct ChunkIndexer {
    store: Arc<dyn VectorStore>,
    embedders: EmbedderRegistry,
    prefix: String,
    settings: IndexerSettings,
    show_progress: bool,
}

impl ChunkIndexer {
    pub fn new(store: Arc<dyn VectorStore>, embedders: EmbedderRegistry, prefix: impl Into<String>, settings: IndexerSettings) -> Self {
        Self { store, embedders, prefix: prefix.into(), settings, show_progress: false }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn collection_for(&self, language: &str, source: &str, model: &str) -> String {
        CollectionName::new(&self.prefix, language, source, model, &self.settings.chunking_method).to_string()
    }

    pub fn index(&self, docs: &[SourceDocument]) -> Result<IndexReport> {
        let mut groups: BTreeMap<(String, String), Vec<&SourceDocument>> = BTreeMap::new();
        for doc in docs {
            groups.entry((doc.language.to_lowercase(), doc.source.clone())).or_default().push(doc);
        }

        let mut report = IndexReport::default();
        for ((language, source), group) in groups {
            let embedder = self.embedders.for_language(&language)?;
            let collection = self.collection_for(&language, &source, embedder.model_id());
            let chunks: Vec<Chunk> = group.iter().flat_map(|doc| build_chunks(doc, &language)).collect();

            let mut seen = if self.settings.dedup_enabled { self.existing_checksums(&collection)? } else { HashSet::new() };
            let mut fresh = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                if chunk.text.trim().is_empty() || (self.settings.dedup_enabled && !seen.insert(chunk.checksum.clone())) {
                    report.skipped += 1;
                } else {
                    fresh.push(chunk);
                }
            }
            info!("Indexing {} chunks into {} ({} skipped so far)", fresh.len(), collection, report.skipped);

            let pb = self.progress_bar(fresh.len());
            for batch in fresh.chunks(self.settings.embedding_batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let embeddings = embedder.embed_batch(&texts).map_err(|e| Error::embedding(&e))?;
                if embeddings.len() != texts.len() {
                    return Err(Error::Embedding(format!(
                        "embedder '{}' returned {} vectors for {} texts",
                        embedder.model_id(),
                        embeddings.len(),
                        texts.len()
                    )));
                }
                self.store.upsert(&collection, batch, &embeddings).map_err(|e| Error::store(&e))?;
                report.indexed += batch.len();
                report.upserted_ids.extend(batch.iter().map(|c| c.id.clone()));
                pb.inc(batch.len() as u64);
            }
            pb.finish_and_clear();
        }
        debug!("Index report: {} indexed, {} skipped", report.indexed, report.skipped);
        Ok(report)
    }

    /// Delete the collection holding `(language, source, model)` chunks; returns its name.
    pub fn delete_collection(&self, language: &str, source: &str, model: &str) -> Result<String> {
        let collection = self.collection_for(language, source, model);
        self.store.delete_collection(&collection).map_err(|e| Error::store(&e))?;
        info!("Deleted collection {}", collection);
        Ok(collection)
    }

    fn existing_checksums(&self, collection: &str) -> Result<HashSet<String>> {
        let names = self.store.list_collections().map_err(|e| Error::store(&e))?;
        if !names.iter().any(|n| n == collection) {
            return Ok(HashSet::new());
        }
        let existing = self.store.get_all(collection, None).map_err(|e| Error::store(&e))?;
        Ok(existing
            .metadatas()
            .iter()
            .filter_map(|m| m.get("checksum").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

fn build_chunks(doc: &SourceDocument, language: &str) -> Vec<Chunk> {
    doc.chunks
        .iter()
        .enumerate()
        .map(|(idx, (text, meta))| {
            let mut extra = meta.clone();
            if let Some(title) = &doc.title {
                extra.entry("title").or_insert_with(|| Value::from(title.clone()));
            }
            if let Some(url) = &doc.url {
                extra.entry("url").or_insert_with(|| Value::from(url.clone()));
            }
            Chunk::new(doc.doc_id.clone(), idx, text.clone(), language, doc.source.clone()).with_extra(extra)
        })
        .collect()
}
