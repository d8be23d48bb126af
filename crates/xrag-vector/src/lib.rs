//! Vector-store adapters and the chunk indexer.
//!
//! - `MemoryStore`: brute-force squared-L2 store behind a `RwLock`
//! - `LanceStore`: one LanceDB table per collection, blocking facade over tokio
//! - `ChunkIndexer`: writes provenance-bearing chunks into
//!   `{prefix}__{lang}__{source}__{model}__{chunking}` collections

pub mod indexer;
pub mod lance;
pub mod memory;

pub use indexer::{ChunkIndexer, IndexReport, SourceDocument};
pub use lance::LanceStore;
pub use memory::MemoryStore;
