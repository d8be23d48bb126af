//! Retrieval over one or many collections, and fusion of the ranked lists.

pub mod fusion;
pub mod keyword;
pub mod retriever;
pub mod search;

pub use fusion::{fuse, FusionOptions};
pub use retriever::{CollectionRetriever, RetrievalMethod, RetrieveOptions};
pub use search::{MultiCollectionSearch, SearchParams};
pub use xrag_core::registry::EmbedderRegistry;
