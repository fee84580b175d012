//! vaultdb-text
//!
//! Keyword engine: a tantivy index over chunk body, note title and section
//! header, analyzed by a pluggable tokenizer and scored with BM25.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod analyzer;
pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use analyzer::{EnglishAnalyzer, PlainTokenizer};
pub use index::KeywordIndex;
pub use search::KeywordSearcher;
