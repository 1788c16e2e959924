//! Densex Search - Vector Stores
//!
//! This crate provides the vector index used for retrieval:
//! - `VectorStore`: upsert / top-k query abstraction
//! - `LocalIndex`: HNSW index using usearch, with a metadata side table
//! - `PineconeIndex`: hosted Pinecone index over REST
//! - `RetryingStore`: input validation, retries and upsert cost accounting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Query embedding (384 dims)                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RetryingStore ── RetryExecutor, UsageLedger                │
//! │  ├─ LocalIndex     data/passages.usearch + .mapping.json    │
//! │  └─ PineconeIndex  POST /vectors/upsert, POST /query        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Match: (id, score, metadata.text)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod pinecone;
pub mod retrying;
pub mod store;

pub use error::{Error, Result};
pub use index::{IndexConfig, LocalIndex};
pub use pinecone::{PineconeConfig, PineconeIndex};
pub use retrying::RetryingStore;
pub use store::{Match, Metadata, VectorRecord, VectorStore, TEXT_KEY};

/// Default location of the local index (without extension)
pub fn default_index_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join(".densex").join("passages"))
        .unwrap_or_else(|| std::path::PathBuf::from(".densex/passages"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_index_path() {
        let path = default_index_path();
        assert!(path.to_string_lossy().contains("passages"));
    }
}
