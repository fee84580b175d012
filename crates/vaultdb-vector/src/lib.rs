//! vaultdb-vector
//!
//! Semantic engine on LanceDB: bounded-concurrency embedding, per-generation
//! `(id, vector)` tables, IVF_PQ for large tables and cosine top-k search.

pub mod embed;
pub mod index_build;
pub mod schema;
pub mod search;
pub mod writer;

pub use embed::{embed_passages, embed_query, EmbedOptions};
pub use search::SemanticIndex;
pub use writer::{build_semantic_index, SemanticBuild};
