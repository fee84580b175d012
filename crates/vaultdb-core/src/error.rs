use std::time::Duration;

use thiserror::Error;

use crate::types::SourceKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{engine} engine unavailable: {reason}")]
    EngineUnavailable { engine: SourceKind, reason: String },

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    #[error("Index build failed: {0}")]
    IndexBuildFailure(String),

    #[error(
        "Generation {generation} rejected: {left} has {left_count} chunk ids, {right} has {right_count} ({missing} not shared)"
    )]
    GenerationMismatch {
        generation: String,
        left: &'static str,
        left_count: usize,
        right: &'static str,
        right_count: usize,
        missing: usize,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn engine(engine: SourceKind, reason: impl std::fmt::Display) -> Self {
        Self::EngineUnavailable { engine, reason: reason.to_string() }
    }

    pub fn build(reason: impl std::fmt::Display) -> Self {
        Self::IndexBuildFailure(reason.to_string())
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetrievalTimeout(_) | Self::RetrievalUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
