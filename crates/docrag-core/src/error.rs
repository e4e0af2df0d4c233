use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Vector index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Wrap any backend error (including `anyhow` chains) as a storage failure.
    pub fn storage<E: Display>(err: E) -> Self {
        Self::StorageFailure(format!("{err:#}"))
    }

    pub fn embedding<E: Display>(err: E) -> Self {
        Self::EmbeddingUnavailable(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
