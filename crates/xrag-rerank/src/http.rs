//! Listwise reranking over HTTP.
//!
//! Speaks the Jina/Cohere rerank API: `POST {model, query, documents, top_n,
//! return_documents}` answered by `{"results": [{"index", "relevance_score",
//! "document"}]}`.

use anyhow::{anyhow, bail, Result};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use xrag_core::config::RerankerSettings;
use xrag_core::traits::{ListwiseHit, ListwiseReranker};

pub struct HttpListwiseReranker {
    client: Client,
    model: String,
    url: String,
    api_key: Option<String>,
}

impl HttpListwiseReranker {
    pub fn new(model: impl Into<String>, url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, model: model.into(), url: url.into(), api_key })
    }

    /// Reads the API key from the variable named by `listwise_api_key_env`;
    /// a missing key is a load failure.
    pub fn from_settings(settings: &RerankerSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.listwise_api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("{} is not set", settings.listwise_api_key_env))?;
        Self::new(
            settings.listwise_model.clone(),
            settings.listwise_url.clone(),
            Some(api_key),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn build_request(&self, query: &str, documents: &[String], top_n: usize) -> Value {
        json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
            "return_documents": true,
        })
    }
}

/// Hits sorted by descending relevance. The text of each hit is the input
/// document at `index`, or the echoed `document` when the index is absent.
pub fn parse_response(documents: &[String], response: &Value) -> Result<Vec<ListwiseHit>> {
    let results = response
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("rerank response has no 'results' array"))?;
    if results.is_empty() {
        warn!("Rerank API returned empty results");
    }

    let mut hits = Vec::with_capacity(results.len());
    for result in results {
        let relevance_score = result
            .get("relevance_score")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("Missing relevance_score in rerank result"))? as f32;
        let document = match result.get("index").and_then(Value::as_u64) {
            Some(i) => documents
                .get(i as usize)
                .cloned()
                .ok_or_else(|| anyhow!("rerank result index {} out of range ({} documents)", i, documents.len()))?,
            None => echoed_text(result).ok_or_else(|| anyhow!("Missing index in rerank result"))?,
        };
        hits.push(ListwiseHit { document, relevance_score });
    }
    hits.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

fn echoed_text(result: &Value) -> Option<String> {
    match result.get("document")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

impl ListwiseReranker for HttpListwiseReranker {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<ListwiseHit>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let payload = self.build_request(query, documents, top_n);
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("rerank API returned {}: {}", status, body);
        }
        let body: Value = response.json()?;
        let mut hits = parse_response(documents, &body)?;
        hits.truncate(top_n);
        debug!("Listwise reranked {} documents with {}", documents.len(), self.model);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<String> {
        vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()]
    }

    #[test]
    fn request_carries_model_and_top_n() {
        let r = HttpListwiseReranker::new("jina-reranker-v3", "http://localhost:9/rerank", None, Duration::from_secs(1)).unwrap();
        let body = r.build_request("q", &docs(), 3);
        assert_eq!(body["model"], "jina-reranker-v3");
        assert_eq!(body["top_n"], 3);
        assert_eq!(body["documents"][2], "alpha");
    }

    #[test]
    fn parses_and_sorts_results() {
        let body = json!({"results": [
            {"index": 2, "relevance_score": 0.4, "document": {"text": "alpha"}},
            {"index": 1, "relevance_score": 0.9},
            {"relevance_score": 0.1, "document": "alpha"}
        ]});
        let hits = parse_response(&docs(), &body).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.document.as_str()).collect();
        assert_eq!(texts, ["beta", "alpha", "alpha"]);
        assert!((hits[0].relevance_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn malformed_results_are_errors() {
        assert!(parse_response(&docs(), &json!({"data": []})).is_err());
        assert!(parse_response(&docs(), &json!({"results": [{"index": 7, "relevance_score": 0.5}]})).is_err());
        assert!(parse_response(&docs(), &json!({"results": [{"index": 0}]})).is_err());
        assert!(parse_response(&docs(), &json!({"results": []})).unwrap().is_empty());
    }

    #[test]
    fn missing_api_key_fails_to_load() {
        let settings = RerankerSettings { listwise_api_key_env: "XRAG_TEST_UNSET_RERANK_KEY".into(), ..RerankerSettings::default() };
        assert!(HttpListwiseReranker::from_settings(&settings).is_err());
    }
}
