//! Embedding providers for vector search
//!
//! - `EmbeddingProvider` trait: one batch request, no retries
//! - `HttpEmbeddingProvider`: OpenAI-compatible `/embeddings` endpoint
//!   (text-embeddings-inference, vLLM, OpenAI, ...)
//! - `Embedder`: validates input and runs a provider under a retry policy
//!
//! # Example
//!
//! ```ignore
//! use densex_llm::{Embedder, EmbeddingConfig, HttpEmbeddingProvider};
//! use std::sync::Arc;
//!
//! let provider = HttpEmbeddingProvider::new(EmbeddingConfig::default())?;
//! let embedder = Embedder::new(Arc::new(provider));
//! let vectors = embedder.embed(&["Hello, world!".to_string()]).await?;
//! assert_eq!(vectors[0].len(), 384);
//! ```

use crate::error::{Error, Result};
use crate::util::mask_optional_key;
use async_trait::async_trait;
use densex_core::{RetryExecutor, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default embedding endpoint (local OpenAI-compatible server)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";
/// Default embedding model
pub const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";
/// Output dimension of [`DEFAULT_MODEL`]
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding providers
///
/// Implementations perform a single request; retries belong to [`Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimension
    fn dimensions(&self) -> usize;

    /// Model name
    fn model(&self) -> &str;
}

/// Scale `vector` to unit length (zero vectors are left untouched)
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

// ============================================================================
// HTTP provider
// ============================================================================

/// Embedding endpoint configuration
#[derive(Clone)]
pub struct EmbeddingConfig {
    /// Bearer token, if the endpoint needs one
    pub api_key: Option<String>,
    /// Base URL (`/embeddings` is appended)
    pub base_url: String,
    /// Model name sent with each request
    pub model: String,
    /// Expected vector dimension
    pub dimensions: usize,
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &mask_optional_key(self.api_key.as_deref()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl EmbeddingConfig {
    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model and its dimension
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Provider for OpenAI-compatible embedding APIs
#[derive(Debug)]
pub struct HttpEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingProvider {
    /// Create a provider
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(Error::NotConfigured(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip(self, texts), fields(model = %self.config.model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("HTTP {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != texts.len() {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for data in parsed.data {
            let mut vector = data.embedding;
            if vector.len() != self.config.dimensions {
                return Err(Error::InvalidResponse(format!(
                    "expected dimension {}, got {}",
                    self.config.dimensions,
                    vector.len()
                )));
            }
            l2_normalize(&mut vector);
            vectors.push(vector);
        }

        debug!(count = vectors.len(), "embeddings received");
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Embedder
// ============================================================================

/// Validated, retried access to an [`EmbeddingProvider`]
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    executor: RetryExecutor,
}

impl fmt::Debug for Embedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.provider.model())
            .field("dimensions", &self.provider.dimensions())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Embedder {
    /// Embedder with 3 attempts, 30 s timeout and 1 s base delay
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
            executor: RetryExecutor::new(),
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a custom executor
    #[must_use]
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Embedding dimension of the provider
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed a non-empty batch of non-blank texts
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "texts must be non-empty strings".to_string(),
            ));
        }

        let provider = &self.provider;
        let vectors = self
            .executor
            .execute(&self.policy, || provider.embed_batch(texts))
            .await
            .map_err(Error::Embedding)?;

        if vectors.len() != texts.len() {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::InvalidResponse("no embedding returned".to_string()))
    }
}
