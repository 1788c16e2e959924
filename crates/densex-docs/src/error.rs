//! Error types for densex-docs

use std::path::PathBuf;
use thiserror::Error;

/// Document parsing error
#[derive(Debug, Error)]
pub enum Error {
    /// Path is missing or not a regular file
    #[error("file does not exist")]
    NotFound(PathBuf),

    /// Extension has no parser
    #[error("unsupported file type")]
    Unsupported(PathBuf),

    /// The reader for this type failed
    #[error("failed to parse document")]
    Parse(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
