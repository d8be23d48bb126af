//! LanceDB-backed [`VectorStore`]: one table per collection.
//!
//! The store owns a tokio runtime and blocks on every call, so it can be used
//! from the synchronous retrieval and indexing paths. Do not call it from
//! inside another runtime.

use anyhow::{anyhow, bail, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

use xrag_core::config::{resolve_with_base, RetrievalSettings};
use xrag_core::error::Error;
use xrag_core::traits::VectorStore;
use xrag_core::types::{Chunk, Hit, Metadata, MetadataFilter, RetrievalResult};

const STRING_COLUMNS: [&str; 4] = ["doc_id", "source", "language", "checksum"];

pub struct LanceStore {
    rt: Runtime,
    db: Connection,
}

impl LanceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let rt = Runtime::new()?;
        let uri = path.as_ref().to_string_lossy().to_string();
        let db = rt.block_on(async { connect(&uri).execute().await })?;
        debug!("Opened LanceDB at {}", uri);
        Ok(Self { rt, db })
    }

    /// Open the store at `retrieval.persist_dir`, resolved against `base`
    /// when relative.
    pub fn from_settings(settings: &RetrievalSettings, base: &Path) -> Result<Self> {
        Self::open(resolve_with_base(base, &settings.persist_dir))
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.db.table_names().execute().await?.iter().any(|n| n == name))
    }

    async fn existing_table(&self, name: &str) -> Result<Table> {
        if !self.has_table(name).await? {
            return Err(Error::NotFound(format!("collection '{name}'")).into());
        }
        Ok(self.db.open_table(name).execute().await?)
    }
}

async fn drain<S, E>(stream: S) -> Result<RetrievalResult>
where
    S: futures::Stream<Item = std::result::Result<RecordBatch, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let batches: Vec<RecordBatch> = stream.try_collect().await?;
    let mut out = RetrievalResult::new();
    for batch in &batches {
        rows_from_batch(batch, &mut out)?;
    }
    Ok(out)
}

pub fn build_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("checksum", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int64, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
    let dim = embeddings.first().map_or(0, Vec::len);
    if embeddings.iter().any(|e| e.len() != dim) {
        bail!("embeddings in one upsert must share a dimension");
    }
    let dim = i32::try_from(dim)?;
    let mut ids = Vec::with_capacity(chunks.len());
    let mut documents = Vec::with_capacity(chunks.len());
    let mut metadatas = Vec::with_capacity(chunks.len());
    let mut doc_ids = Vec::with_capacity(chunks.len());
    let mut sources = Vec::with_capacity(chunks.len());
    let mut languages = Vec::with_capacity(chunks.len());
    let mut checksums = Vec::with_capacity(chunks.len());
    let mut chunk_indices = Vec::with_capacity(chunks.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        ids.push(chunk.id.clone());
        documents.push(chunk.text.clone());
        metadatas.push(serde_json::to_string(&chunk.metadata())?);
        doc_ids.push(chunk.doc_id.clone());
        sources.push(chunk.source.clone());
        languages.push(chunk.language.clone());
        checksums.push(chunk.checksum.clone());
        chunk_indices.push(i64::try_from(chunk.chunk_index)?);
        vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
    }
    let batch = RecordBatch::try_new(build_schema(dim), vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(documents)),
        Arc::new(StringArray::from(metadatas)),
        Arc::new(StringArray::from(doc_ids)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(languages)),
        Arc::new(StringArray::from(checksums)),
        Arc::new(Int64Array::from(chunk_indices)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
    ])?;
    Ok(batch)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column '{}' missing or not utf8", name))
}

fn rows_from_batch(batch: &RecordBatch, out: &mut RetrievalResult) -> Result<()> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document")?;
    let metadatas = string_column(batch, "metadata")?;
    let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    for i in 0..batch.num_rows() {
        let metadata: Metadata = serde_json::from_str(metadatas.value(i))?;
        let distance = distances.filter(|d| d.is_valid(i)).map(|d| d.value(i));
        out.push(Hit {
            id: ids.value(i).to_string(),
            document: documents.value(i).to_string(),
            metadata,
            distance,
        });
    }
    Ok(())
}

/// SQL predicate for a filter over the promoted columns.
pub fn filter_to_predicate(filter: &MetadataFilter) -> xrag_core::Result<String> {
    let mut clauses = Vec::new();
    for (key, value) in filter.clauses() {
        let clause = match (key, value) {
            (k, Value::String(s)) if STRING_COLUMNS.contains(&k) => format!("{} = '{}'", k, s.replace('\'', "''")),
            ("chunk_index", Value::Number(n)) if n.is_u64() => format!("chunk_index = {}", n),
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "cannot filter LanceDB collections on '{key}' = {value}; filterable: doc_id, source, language, checksum (strings), chunk_index (integer)"
                )))
            }
        };
        clauses.push(clause);
    }
    Ok(clauses.join(" AND "))
}

fn predicate(filter: Option<&MetadataFilter>) -> Result<Option<String>> {
    match filter {
        Some(f) if !f.is_empty() => Ok(Some(filter_to_predicate(f)?)),
        _ => Ok(None),
    }
}

impl VectorStore for LanceStore {
    fn query_by_embedding(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::new());
        }
        let predicate = predicate(filter)?;
        self.rt.block_on(async {
            let table = self.existing_table(collection).await?;
            let mut query = table.vector_search(embedding.to_vec())?.limit(k);
            if let Some(p) = predicate {
                query = query.only_if(p);
            }
            let stream = query.execute().await?;
            drain(stream).await
        })
    }

    fn get_all(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<RetrievalResult> {
        let predicate = predicate(filter)?;
        self.rt.block_on(async {
            let table = self.existing_table(collection).await?;
            let mut query = table.query();
            if let Some(p) = predicate {
                query = query.only_if(p);
            }
            let stream = query.execute().await?;
            drain(stream).await
        })
    }

    fn upsert(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!("{} chunks but {} embeddings", chunks.len(), embeddings.len());
        }
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = chunks_to_record_batch(chunks, embeddings)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.rt.block_on(async {
            if self.has_table(collection).await? {
                let table = self.db.open_table(collection).execute().await?;
                let mut mi = table.merge_insert(&["id"]);
                mi.when_matched_update_all(None).when_not_matched_insert_all();
                mi.execute(reader).await?;
            } else {
                self.db.create_table(collection, reader).execute().await?;
            }
            debug!("Upserted {} rows into {}", chunks.len(), collection);
            Ok::<_, anyhow::Error>(())
        })
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        self.rt.block_on(async { Ok::<_, anyhow::Error>(self.db.table_names().execute().await?) })
    }

    fn delete_collection(&self, collection: &str) -> Result<()> {
        self.rt.block_on(async {
            let table = self.existing_table(collection).await?;
            table.delete("true").await?;
            Ok::<_, anyhow::Error>(())
        })
    }
}
