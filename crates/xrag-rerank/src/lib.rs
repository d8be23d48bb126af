//! Candidate reranking with a lazily loaded scoring backend.
//!
//! Backends, in order of preference: listwise (HTTP, Jina/Cohere-compatible),
//! pairwise (candle cross-encoder) and embedding cosine similarity. The
//! engine falls back down that chain when a backend cannot be loaded.

pub mod backend;
pub mod engine;
pub mod http;

pub use backend::{assign_listwise_scores, BackendLoader, ModelBackendLoader, ScoringBackend};
pub use engine::{LoadState, RerankingEngine};
pub use http::HttpListwiseReranker;
pub use xrag_core::config::BackendKind;
