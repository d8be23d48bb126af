//! `RerankingEngine`: lazy backend loading, scoring, normalization and truncation.

use std::fmt;
use tracing::{debug, info, warn};

use xrag_core::config::{BackendKind, RerankerSettings};
use xrag_core::error::{Error, Result};
use xrag_core::score::min_max_normalize;
use xrag_core::types::Document;

use crate::backend::{BackendLoader, ModelBackendLoader, ScoringBackend};

/// Where the engine is in `Unloaded -> Loading -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready(BackendKind),
}

enum Slot {
    Unloaded,
    Loading,
    Ready(ScoringBackend),
}

pub struct RerankingEngine {
    settings: RerankerSettings,
    loader: Box<dyn BackendLoader>,
    slot: Slot,
}

impl fmt::Debug for RerankingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RerankingEngine")
            .field("backend", &self.settings.backend)
            .field("state", &self.state())
            .finish()
    }
}

impl RerankingEngine {
    pub fn new(settings: RerankerSettings) -> Self {
        let loader = ModelBackendLoader::new(settings.clone());
        Self::with_loader(settings, loader)
    }

    pub fn with_loader(settings: RerankerSettings, loader: impl BackendLoader + 'static) -> Self {
        Self { settings, loader: Box::new(loader), slot: Slot::Unloaded }
    }

    pub fn settings(&self) -> &RerankerSettings {
        &self.settings
    }

    pub fn state(&self) -> LoadState {
        match &self.slot {
            Slot::Unloaded => LoadState::Unloaded,
            Slot::Loading => LoadState::Loading,
            Slot::Ready(backend) => LoadState::Ready(backend.kind()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.slot, Slot::Ready(_))
    }

    /// The backend serving requests, once loaded.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        match &self.slot {
            Slot::Ready(backend) => Some(backend.kind()),
            _ => None,
        }
    }

    /// Load the configured backend, falling back down
    /// `listwise -> pairwise -> embedding`. A no-op once loaded.
    ///
    /// If nothing in the chain loads, the engine returns to `Unloaded` and
    /// the next call tries again.
    pub fn load(&mut self) -> Result<BackendKind> {
        if let Slot::Ready(backend) = &self.slot {
            return Ok(backend.kind());
        }
        self.slot = Slot::Loading;

        let mut failures = Vec::new();
        for &kind in self.settings.backend.fallback_chain() {
            match self.loader.load(kind) {
                Ok(backend) => {
                    info!("Reranker backend '{}' loaded ({})", kind, backend.model_id());
                    self.slot = Slot::Ready(backend);
                    return Ok(kind);
                }
                Err(e) => {
                    warn!("Failed to load {} reranker backend: {e:#}", kind);
                    failures.push(format!("{kind}: {e:#}"));
                }
            }
        }
        self.slot = Slot::Unloaded;
        Err(Error::BackendUnavailable(failures.join("; ")))
    }

    /// Score `documents` against `query` and return the best `top_k`
    /// (default `settings.top_k`), highest first, each with a `score` field.
    ///
    /// Inputs are never modified; returned documents are copies.
    pub fn rerank(&mut self, query: &str, documents: &[Document], top_k: Option<usize>) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.load()?;
        let Slot::Ready(backend) = &self.slot else {
            return Err(Error::BackendUnavailable("reranker backend not loaded".into()));
        };

        let texts: Vec<String> = documents.iter().map(|d| d.text().to_string()).collect();
        // One score per text: short batches are zero-filled or rejected by the backend.
        let mut scores = backend.score(query, &texts)?;
        if self.settings.normalize_scores {
            min_max_normalize(&mut scores);
        }

        let mut order: Vec<usize> = (0..documents.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
        order.truncate(top_k.unwrap_or(self.settings.top_k));

        debug!("Reranked {} documents with {}, keeping {}", documents.len(), backend.kind(), order.len());
        Ok(order.into_iter().map(|i| documents[i].clone().with_score(scores[i])).collect())
    }
}
