//! vaultdb-core
//!
//! Shared domain types, capability traits, configuration, vault scanning and
//! chunking for the vaultdb retrieval engine.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod settings;
pub mod traits;
pub mod types;
pub mod vault;

pub use chunker::{Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use settings::Settings;
pub use types::{Chunk, ChunkId, EmbedKind, Note, RetrievedChunk, SearchHit, SourceKind};
