//! Error types for densex-core

use thiserror::Error;

use crate::cost::LedgerError;
use crate::retry::RetryError;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Citation span could not be produced
    #[error("citation error: {0}")]
    Citation(String),

    /// Retried operation failed
    #[error(transparent)]
    Retry(#[from] RetryError),

    /// Cost ledger failure (including budget breaches)
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
