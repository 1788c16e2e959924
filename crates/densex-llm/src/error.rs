//! Error types for densex-llm

use densex_core::{LedgerError, RetryError};
use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Caller input rejected before any request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Embedding retries exhausted
    #[error("embedding failed")]
    Embedding(#[source] RetryError),

    /// Completion retries exhausted
    #[error("OpenRouter request failed")]
    Completion(#[source] RetryError),

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

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
