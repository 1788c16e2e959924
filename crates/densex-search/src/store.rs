//! Vector store abstraction

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Free-form metadata stored next to a vector
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key holding the passage text
pub const TEXT_KEY: &str = "text";

/// A vector with its id and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique id; upserting an existing id replaces it
    pub id: String,
    /// Vector values
    pub values: Vec<f32>,
    /// Metadata returned with matches
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl VectorRecord {
    /// Record without metadata
    #[must_use]
    pub fn new(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the passage text
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_metadata(TEXT_KEY, text.into())
    }
}

/// A ranked query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Record id
    pub id: String,
    /// Similarity (higher is closer)
    pub score: f32,
    /// Metadata stored with the record
    #[serde(default)]
    pub metadata: Metadata,
}

impl Match {
    /// Passage text, if the record carried one
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.metadata.get(TEXT_KEY).and_then(Value::as_str)
    }
}

/// A vector index supporting upsert and top-k query.
///
/// Implementations perform one attempt per call; retries belong to
/// [`crate::RetryingStore`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace `records`; returns the number written
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Up to `top_k` matches ordered by descending score
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>>;

    /// Store name for logs
    fn name(&self) -> &str;

    /// Make written records durable (no-op for remote stores)
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        (**self).upsert(records).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        (**self).query(vector, top_k).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn persist(&self) -> Result<()> {
        (**self).persist().await
    }
}
