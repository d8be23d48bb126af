use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use xrag_core::error::Error;
use xrag_core::traits::VectorStore;
use xrag_core::types::{Chunk, Hit, Metadata, MetadataFilter, RetrievalResult};

struct Row {
    id: String,
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Collection {
    rows: Vec<Row>,
    by_id: HashMap<String, usize>,
    dim: Option<usize>,
}

/// In-process store with exact search. Distances are squared L2.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `collection`, 0 if it does not exist.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, |c| c.rows.len()))
            .unwrap_or(0)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn missing(collection: &str) -> anyhow::Error {
    Error::NotFound(format!("collection '{collection}'")).into()
}

fn passes(filter: Option<&MetadataFilter>, metadata: &Metadata) -> bool {
    filter.map_or(true, |f| f.matches(metadata))
}

impl VectorStore for MemoryStore {
    fn query_by_embedding(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        let guard = self.collections.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        if let Some(dim) = coll.dim {
            if dim != embedding.len() {
                bail!("query dimension {} does not match collection dimension {}", embedding.len(), dim);
            }
        }
        let mut scored: Vec<(f32, &Row)> = coll
            .rows
            .iter()
            .filter(|r| passes(filter, &r.metadata))
            .map(|r| (squared_l2(&r.embedding, embedding), r))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(d, r)| Hit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: Some(d),
            })
            .collect())
    }

    fn get_all(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<RetrievalResult> {
        let guard = self.collections.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll
            .rows
            .iter()
            .filter(|r| passes(filter, &r.metadata))
            .map(|r| Hit { id: r.id.clone(), document: r.document.clone(), metadata: r.metadata.clone(), distance: None })
            .collect())
    }

    fn upsert(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!("{} chunks but {} embeddings", chunks.len(), embeddings.len());
        }
        let mut guard = self.collections.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        // The whole batch is checked before any row is written.
        let existing = guard.get(collection).and_then(|c| c.dim);
        if let Some(dim) = existing.or_else(|| embeddings.first().map(Vec::len)) {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
                bail!("embedding dimension {} does not match collection dimension {}", bad.len(), dim);
            }
        }
        let coll = guard.entry(collection.to_string()).or_default();
        if coll.dim.is_none() {
            coll.dim = embeddings.first().map(Vec::len);
        }
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let row = Row {
                id: chunk.id.clone(),
                document: chunk.text.clone(),
                metadata: chunk.metadata(),
                embedding: embedding.clone(),
            };
            match coll.by_id.get(&chunk.id) {
                Some(&pos) => coll.rows[pos] = row,
                None => {
                    coll.by_id.insert(chunk.id.clone(), coll.rows.len());
                    coll.rows.push(row);
                }
            }
        }
        Ok(())
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let guard = self.collections.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.keys().cloned().collect())
    }

    fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut guard = self.collections.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| missing(collection))
    }
}
