//! vaultdb-hybrid
//!
//! Ties both engines together: the generation store, the rebuild pipeline and
//! the retrieval service with reciprocal-rank fusion.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod fusion;
pub mod pipeline;
pub mod service;
pub mod store;

pub use fusion::{reciprocal_rank_fusion, FusedHit, RRF_K};
pub use pipeline::{BuildReport, IndexBuilder};
pub use service::RetrievalService;
pub use store::{Generation, IndexStore, Manifest, StagedGeneration};
