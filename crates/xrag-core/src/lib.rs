#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod collection;
pub mod config;
pub mod error;
pub mod registry;
pub mod score;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use registry::EmbedderRegistry;
pub use types::{Chunk, DedupKey, Document, Hit, Metadata, MetadataFilter, RetrievalResult};
