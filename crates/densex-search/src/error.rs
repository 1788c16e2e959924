//! Error types for densex-search

use densex_core::{LedgerError, RetryError};
use thiserror::Error;

/// Error type for vector store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input rejected before any request
    #[error("{0}")]
    InvalidInput(String),

    /// Index operation failed
    #[error("Index error: {0}")]
    Index(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: usize,
        /// Actual dimensions
        actual: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote index transport failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote index answered with an error
    #[error("api error: {0}")]
    Api(String),

    /// Upsert retries exhausted
    #[error("upsert failed")]
    Upsert(#[source] RetryError),

    /// Query retries exhausted
    #[error("query failed")]
    Query(#[source] RetryError),

    /// Cost could not be recorded, or the budget is exhausted
    #[error(transparent)]
    Usage(#[from] LedgerError),
}

impl Error {
    /// Whether the usage ledger reported a budget breach
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Error::Usage(e) if e.is_budget_exceeded())
    }
}

/// Result type for vector store operations
pub type Result<T> = std::result::Result<T, Error>;
