//! Domain types shared by the stores, retrievers, fusion and reranking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::score::distance_to_similarity;

pub type ChunkId = String;
pub type Metadata = serde_json::Map<String, Value>;

/// Number of leading characters used as the last-resort dedup identity.
pub const TEXT_KEY_CHARS: usize = 200;

/// Content hash used for chunk identity and deduplication.
pub fn checksum_of(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// An indexed unit of text with its provenance.
///
/// - `id`: `"{doc_id}__chunk_{chunk_index}__{checksum[..12]}"`, unique per collection
/// - `checksum`: blake3 hex of `text`
/// - `chunk_index`: position within the parent document for one chunking run
/// - `extra`: chunker-provided metadata (title, url, character offsets, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub checksum: String,
    pub language: String,
    pub source: String,
    #[serde(default)]
    pub extra: Metadata,
}

impl Chunk {
    pub fn new(
        doc_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let doc_id = doc_id.into();
        let text = text.into();
        let checksum = checksum_of(&text);
        let id = format!("{}__chunk_{}__{}", doc_id, chunk_index, &checksum[..12]);
        Self {
            id,
            text,
            doc_id,
            chunk_index,
            checksum,
            language: language.into(),
            source: source.into(),
            extra: Metadata::new(),
        }
    }

    pub fn with_extra(mut self, extra: Metadata) -> Self {
        self.extra = extra;
        self
    }

    /// Flat metadata as stored next to the vector. Provenance keys win over
    /// any same-named key in `extra`.
    pub fn metadata(&self) -> Metadata {
        let mut meta = self.extra.clone();
        meta.insert("doc_id".into(), Value::from(self.doc_id.clone()));
        meta.insert("chunk_index".into(), Value::from(self.chunk_index));
        meta.insert("checksum".into(), Value::from(self.checksum.clone()));
        meta.insert("language".into(), Value::from(self.language.clone()));
        meta.insert("source".into(), Value::from(self.source.clone()));
        meta
    }
}

/// Conjunction of metadata equality constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key == value`.
    #[must_use]
    pub fn equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

/// One row of a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: ChunkId,
    pub document: String,
    pub metadata: Metadata,
    pub distance: Option<f32>,
}

impl Hit {
    pub fn similarity(&self) -> f32 {
        distance_to_similarity(self.distance)
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::derive(&self.metadata, &self.document)
    }
}

/// Column-oriented retrieval output: `ids`, `documents`, `metadatas` and
/// `distances` are positionally aligned.
///
/// Columns are only reachable through row operations, so no transformation
/// can truncate one column without the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResultColumns")]
pub struct RetrievalResult {
    ids: Vec<ChunkId>,
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
    distances: Vec<Option<f32>>,
}

#[derive(Deserialize)]
struct ResultColumns {
    #[serde(default)]
    ids: Vec<ChunkId>,
    #[serde(default)]
    documents: Vec<String>,
    #[serde(default)]
    metadatas: Vec<Option<Metadata>>,
    #[serde(default)]
    distances: Vec<Option<f32>>,
}

impl TryFrom<ResultColumns> for RetrievalResult {
    type Error = Error;

    fn try_from(c: ResultColumns) -> Result<Self> {
        let metadatas = c.metadatas.into_iter().map(Option::unwrap_or_default).collect();
        Self::from_columns(c.ids, c.documents, metadatas, c.distances)
    }
}

impl RetrievalResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            documents: Vec::with_capacity(n),
            metadatas: Vec::with_capacity(n),
            distances: Vec::with_capacity(n),
        }
    }

    /// Build from raw columns as a store returns them.
    ///
    /// Missing trailing distances are padded with `None` and missing metadatas
    /// with empty maps. `ids` and `documents` must have the same length, and
    /// surplus metadatas/distances are rejected.
    pub fn from_columns(
        ids: Vec<ChunkId>,
        documents: Vec<String>,
        mut metadatas: Vec<Metadata>,
        mut distances: Vec<Option<f32>>,
    ) -> Result<Self> {
        let n = documents.len();
        if ids.len() != n {
            return Err(Error::StoreQuery(format!(
                "misaligned result: {} ids for {} documents",
                ids.len(),
                n
            )));
        }
        if metadatas.len() > n || distances.len() > n {
            return Err(Error::StoreQuery(format!(
                "misaligned result: {} metadatas / {} distances for {} documents",
                metadatas.len(),
                distances.len(),
                n
            )));
        }
        metadatas.resize_with(n, Metadata::new);
        distances.resize(n, None);
        Ok(Self { ids, documents, metadatas, distances })
    }

    pub fn push(&mut self, hit: Hit) {
        self.ids.push(hit.id);
        self.documents.push(hit.document);
        self.metadatas.push(hit.metadata);
        self.distances.push(hit.distance);
    }

    pub fn truncate(&mut self, len: usize) {
        self.ids.truncate(len);
        self.documents.truncate(len);
        self.metadatas.truncate(len);
        self.distances.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ChunkId] {
        &self.ids
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }

    pub fn distances(&self) -> &[Option<f32>] {
        &self.distances
    }

    pub fn get(&self, i: usize) -> Option<Hit> {
        Some(Hit {
            id: self.ids.get(i)?.clone(),
            document: self.documents.get(i)?.clone(),
            metadata: self.metadatas.get(i)?.clone(),
            distance: *self.distances.get(i)?,
        })
    }

    pub fn hits(&self) -> impl Iterator<Item = Hit> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn into_hits(self) -> Vec<Hit> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .zip(self.distances)
            .map(|(((id, document), metadata), distance)| Hit { id, document, metadata, distance })
            .collect()
    }
}

impl FromIterator<Hit> for RetrievalResult {
    fn from_iter<I: IntoIterator<Item = Hit>>(iter: I) -> Self {
        let mut out = Self::new();
        for hit in iter {
            out.push(hit);
        }
        out
    }
}

/// Identity used to detect that two retrieved items are the same logical chunk.
///
/// Derived in priority order: `(doc_id, chunk_index)`, then `checksum`, then the
/// first [`TEXT_KEY_CHARS`] characters of the trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    DocChunk(String, String),
    Checksum(String),
    TextPrefix(String),
}

impl DedupKey {
    pub fn derive(metadata: &Metadata, text: &str) -> Self {
        let doc_id = metadata.get("doc_id").filter(|v| is_truthy(v));
        let chunk_index = metadata.get("chunk_index").filter(|v| !v.is_null());
        if let (Some(doc_id), Some(chunk_index)) = (doc_id, chunk_index) {
            return Self::DocChunk(value_key(doc_id), value_key(chunk_index));
        }
        if let Some(checksum) = metadata.get("checksum").filter(|v| is_truthy(v)) {
            return Self::Checksum(value_key(checksum));
        }
        Self::TextPrefix(text.trim().chars().take(TEXT_KEY_CHARS).collect())
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    }
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A rerank candidate: a JSON object that always carries a string `text`.
///
/// Deserialises from either a bare string or an object with `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentRepr", into = "Metadata")]
pub struct Document {
    fields: Metadata,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentRepr {
    Text(String),
    Fields(Metadata),
}

impl TryFrom<DocumentRepr> for Document {
    type Error = Error;

    fn try_from(repr: DocumentRepr) -> Result<Self> {
        match repr {
            DocumentRepr::Text(text) => Ok(Self::new(text)),
            DocumentRepr::Fields(fields) => Self::from_fields(fields),
        }
    }
}

impl From<Document> for Metadata {
    fn from(doc: Document) -> Self {
        doc.fields
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<Hit> for Document {
    fn from(hit: Hit) -> Self {
        let mut fields = Metadata::new();
        fields.insert("id".into(), Value::from(hit.id));
        fields.insert("text".into(), Value::from(hit.document));
        fields.insert("metadata".into(), Value::Object(hit.metadata));
        Self { fields }
    }
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        let mut fields = Metadata::new();
        fields.insert("text".into(), Value::from(text.into()));
        Self { fields }
    }

    pub fn from_fields(fields: Metadata) -> Result<Self> {
        match fields.get("text") {
            Some(Value::String(_)) => Ok(Self { fields }),
            Some(_) => Err(Error::InvalidDocument("'text' must be a string".into())),
            None => Err(Error::InvalidDocument("document has no 'text' field".into())),
        }
    }

    /// Every row of a retrieval result as a rerank candidate.
    pub fn from_result(result: &RetrievalResult) -> Vec<Self> {
        result.hits().map(Self::from).collect()
    }

    pub fn text(&self) -> &str {
        self.fields.get("text").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Metadata {
        &self.fields
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn score(&self) -> Option<f32> {
        self.fields.get("score").and_then(Value::as_f64).map(|s| s as f32)
    }

    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.fields.insert("score".into(), Value::from(f64::from(score)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        match v {
            Value::Object(m) => m,
            _ => Metadata::new(),
        }
    }

    #[test]
    fn chunk_id_and_checksum_follow_text() {
        let c = Chunk::new("wiki_en_1", 3, "hello", "en", "wiki");
        assert_eq!(c.checksum, checksum_of("hello"));
        assert_eq!(c.id, format!("wiki_en_1__chunk_3__{}", &c.checksum[..12]));
        let m = c.metadata();
        assert_eq!(m["chunk_index"], json!(3));
        assert_eq!(m["source"], json!("wiki"));
    }

    #[test]
    fn provenance_keys_override_extra() {
        let c = Chunk::new("d", 0, "t", "en", "wiki")
            .with_extra(meta(json!({"source": "spoofed", "title": "T"})));
        let m = c.metadata();
        assert_eq!(m["source"], json!("wiki"));
        assert_eq!(m["title"], json!("T"));
    }

    #[test]
    fn from_columns_pads_missing_distances() {
        let r = RetrievalResult::from_columns(
            vec!["a".into(), "b".into()],
            vec!["A".into(), "B".into()],
            vec![Metadata::new()],
            vec![Some(0.5)],
        )
        .expect("aligned");
        assert_eq!(r.len(), 2);
        assert_eq!(r.distances(), &[Some(0.5), None]);
        assert_eq!(r.metadatas().len(), 2);
    }

    #[test]
    fn from_columns_rejects_id_document_mismatch() {
        let err = RetrievalResult::from_columns(vec!["a".into()], vec![], vec![], vec![]);
        assert!(matches!(err, Err(Error::StoreQuery(_))));
    }

    #[test]
    fn truncate_keeps_columns_aligned() {
        let mut r: RetrievalResult = (0..5)
            .map(|i| Hit {
                id: format!("id{i}"),
                document: format!("doc {i}"),
                metadata: Metadata::new(),
                distance: Some(i as f32),
            })
            .collect();
        r.truncate(2);
        assert_eq!(r.ids().len(), 2);
        assert_eq!(r.documents().len(), 2);
        assert_eq!(r.metadatas().len(), 2);
        assert_eq!(r.distances().len(), 2);
    }

    #[test]
    fn result_json_round_trips_columnar_shape() {
        let raw = json!({
            "ids": ["x"],
            "documents": ["text"],
            "metadatas": [null],
            "distances": [0.25]
        });
        let r: RetrievalResult = serde_json::from_value(raw).expect("parse");
        assert_eq!(r.metadatas()[0], Metadata::new());
        let back = serde_json::to_value(&r).expect("serialize");
        assert_eq!(back["ids"], json!(["x"]));
        assert_eq!(back["distances"], json!([0.25]));
    }

    #[test]
    fn dedup_key_priority() {
        let both = meta(json!({"doc_id": "d1", "chunk_index": 0, "checksum": "abc"}));
        assert_eq!(DedupKey::derive(&both, "x"), DedupKey::DocChunk("d1".into(), "0".into()));

        let checksum_only = meta(json!({"doc_id": "", "checksum": "abc"}));
        assert_eq!(DedupKey::derive(&checksum_only, "x"), DedupKey::Checksum("abc".into()));

        let long = format!("  {}", "y".repeat(300));
        assert_eq!(
            DedupKey::derive(&Metadata::new(), &long),
            DedupKey::TextPrefix("y".repeat(TEXT_KEY_CHARS))
        );
    }

    #[test]
    fn document_requires_text() {
        assert!(Document::from_fields(meta(json!({"title": "x"}))).is_err());
        assert!(Document::from_fields(meta(json!({"text": 3}))).is_err());
        let d: Document = serde_json::from_value(json!("plain")).expect("string doc");
        assert_eq!(d.text(), "plain");
        let d: Document = serde_json::from_value(json!({"text": "t", "id": 7})).expect("object doc");
        assert_eq!(d.get("id"), Some(&json!(7)));
        assert!(serde_json::from_value::<Document>(json!({"id": 7})).is_err());
    }

    #[test]
    fn score_is_attached_as_a_field() {
        let d = Document::new("t").with_score(0.25);
        assert_eq!(d.score(), Some(0.25));
        let m: Metadata = d.into();
        assert_eq!(m["score"], json!(0.25));
    }

    #[test]
    fn filter_matches_equality_conjunction() {
        let m = meta(json!({"source": "wiki", "language": "en"}));
        assert!(MetadataFilter::new().equals("source", "wiki").matches(&m));
        assert!(!MetadataFilter::new().equals("source", "wiki").equals("language", "de").matches(&m));
        assert!(MetadataFilter::new().matches(&m));
    }
}
