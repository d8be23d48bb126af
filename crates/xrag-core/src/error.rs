use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The embedding capability failed or returned no/malformed vectors.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// The vector store raised while serving a query, dump or write.
    #[error("Vector store query failed: {0}")]
    StoreQuery(String),

    /// Every scoring backend in the reranker's chain failed to load.
    #[error("No reranking backend available: {0}")]
    BackendUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Unknown retrieval method: {0}. Supported: semantic, keyword, hybrid")]
    UnknownMethod(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Wrap a collaborator failure from the embedding capability.
    pub fn embedding(err: &anyhow::Error) -> Self {
        Self::Embedding(format!("{err:#}"))
    }

    /// Wrap a collaborator failure from the vector store.
    pub fn store(err: &anyhow::Error) -> Self {
        Self::StoreQuery(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
