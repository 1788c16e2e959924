//! Pinecone - hosted vector database over REST
//!
//! Uses the data-plane endpoints of a single index host:
//! `POST /vectors/upsert` and `POST /query`, authenticated with the
//! `Api-Key` header.

use crate::error::{Error, Result};
use crate::store::{Match, Metadata, VectorRecord, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Pinecone index configuration
#[derive(Clone)]
pub struct PineconeConfig {
    /// API key
    pub api_key: String,
    /// Index host, e.g. `my-index-abc123.svc.us-east1-gcp.pinecone.io`
    pub host: String,
    /// Namespace within the index
    pub namespace: Option<String>,
}

impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.api_key.chars().collect();
        let masked = if chars.len() <= 8 {
            "****".to_string()
        } else {
            format!("****{}", chars[chars.len() - 4..].iter().collect::<String>())
        };
        f.debug_struct("PineconeConfig")
            .field("api_key", &masked)
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl PineconeConfig {
    /// Create a configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: host.into(),
            namespace: None,
        }
    }

    /// Create from `PINECONE_API_KEY` and `PINECONE_INDEX_HOST`
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::InvalidInput(format!("{name} not set")))
        };
        Ok(Self::new(read("PINECONE_API_KEY")?, read("PINECONE_INDEX_HOST")?))
    }

    /// Set the namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

// ============================================================================
// Index
// ============================================================================

/// Remote Pinecone index
#[derive(Debug)]
pub struct PineconeIndex {
    client: Client,
    config: PineconeConfig,
}

impl PineconeIndex {
    /// Create a client for one index host
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    async fn post<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{path}", self.config.base_url());
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Api(format!("HTTP {status}: {snippet}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for PineconeIndex {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let request = UpsertRequest {
            vectors: records,
            namespace: self.config.namespace.as_deref(),
        };
        let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
        Ok(response.upserted_count.unwrap_or(records.len()))
    }

    #[instrument(skip(self, vector))]
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.config.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("/query", &request).await?;
        Ok(response
            .matches
            .into_iter()
            .map(|m| Match {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
