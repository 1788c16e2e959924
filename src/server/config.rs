//! Server configuration types
//!
//! Contains all configuration structures for the Densex server.

use densex_core::{DashboardConfig, LedgerConfig, RetryPolicy};
use densex_llm::util::mask_optional_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingAppConfig,
    #[serde(default)]
    pub index: IndexAppConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Usage ledger and dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_alert_limit")]
    pub alert_limit: f64,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default = "default_retries")]
    pub dashboard_retries: u32,
    #[serde(default = "default_dashboard_timeout")]
    pub dashboard_timeout_secs: f64,
    #[serde(default = "default_base_delay")]
    pub dashboard_base_delay_secs: f64,
}

fn default_alert_limit() -> f64 {
    densex_core::cost::DEFAULT_ALERT_LIMIT
}

fn default_log_path() -> PathBuf {
    PathBuf::from(densex_core::cost::DEFAULT_LOG_PATH)
}

fn default_retries() -> u32 {
    3
}

fn default_dashboard_timeout() -> f64 {
    5.0
}

fn default_base_delay() -> f64 {
    1.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            alert_limit: default_alert_limit(),
            log_path: default_log_path(),
            dashboard_url: None,
            dashboard_retries: default_retries(),
            dashboard_timeout_secs: default_dashboard_timeout(),
            dashboard_base_delay_secs: default_base_delay(),
        }
    }
}

impl MonitorConfig {
    /// Ledger settings; a blank dashboard URL disables the dashboard
    pub fn ledger_config(&self) -> LedgerConfig {
        let config = LedgerConfig::default()
            .with_alert_limit(self.alert_limit)
            .with_log_path(self.log_path.clone());

        match self.dashboard_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => config.with_dashboard(
                DashboardConfig::new(url)
                    .with_retries(self.dashboard_retries)
                    .with_timeout(secs(self.dashboard_timeout_secs))
                    .with_base_delay(secs(self.dashboard_base_delay_secs)),
            ),
            _ => config,
        }
    }
}

/// Language-model gateway
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub price_per_1k: f64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: f64,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
}

fn default_llm_base_url() -> String {
    densex_llm::openrouter::BASE_URL.to_string()
}

fn default_llm_model() -> String {
    densex_llm::openrouter::DEFAULT_MODEL.to_string()
}

fn default_llm_timeout() -> f64 {
    30.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            price_per_1k: 0.0,
            retries: default_retries(),
            timeout_secs: default_llm_timeout(),
            base_delay_secs: default_base_delay(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &mask_optional_key(self.api_key.as_deref()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("price_per_1k", &self.price_per_1k)
            .field("retries", &self.retries)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    /// Whether an API key is present
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs_f64(self.retries, self.base_delay_secs, self.timeout_secs)
    }
}

/// Embedding endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingAppConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: f64,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
}

fn default_embedding_base_url() -> String {
    densex_llm::embeddings::DEFAULT_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    densex_llm::embeddings::DEFAULT_MODEL.to_string()
}

fn default_dimensions() -> usize {
    densex_llm::embeddings::DEFAULT_DIMENSIONS
}

impl Default for EmbeddingAppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            retries: default_retries(),
            timeout_secs: default_llm_timeout(),
            base_delay_secs: default_base_delay(),
        }
    }
}

impl fmt::Debug for EmbeddingAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingAppConfig")
            .field("api_key", &mask_optional_key(self.api_key.as_deref()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("retries", &self.retries)
            .finish()
    }
}

impl EmbeddingAppConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs_f64(self.retries, self.base_delay_secs, self.timeout_secs)
    }
}

/// Vector index backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Local,
    Pinecone,
}

/// Vector index
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexAppConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    /// Local index location without extension; defaults to the user data dir
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: f64,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    /// Charged to the ledger per upsert call
    #[serde(default)]
    pub upsert_cost: f64,
    #[serde(default)]
    pub pinecone_api_key: Option<String>,
    #[serde(default)]
    pub pinecone_host: Option<String>,
    #[serde(default)]
    pub pinecone_namespace: Option<String>,
}

fn default_top_k() -> usize {
    1
}

fn default_index_timeout() -> f64 {
    10.0
}

impl Default for IndexAppConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Local,
            path: None,
            dimensions: default_dimensions(),
            top_k: default_top_k(),
            retries: default_retries(),
            timeout_secs: default_index_timeout(),
            base_delay_secs: default_base_delay(),
            upsert_cost: 0.0,
            pinecone_api_key: None,
            pinecone_host: None,
            pinecone_namespace: None,
        }
    }
}

impl fmt::Debug for IndexAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexAppConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("dimensions", &self.dimensions)
            .field("top_k", &self.top_k)
            .field("retries", &self.retries)
            .field("upsert_cost", &self.upsert_cost)
            .field("pinecone_api_key", &mask_optional_key(self.pinecone_api_key.as_deref()))
            .field("pinecone_host", &self.pinecone_host)
            .field("pinecone_namespace", &self.pinecone_namespace)
            .finish()
    }
}

impl IndexAppConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs_f64(self.retries, self.base_delay_secs, self.timeout_secs)
    }

    /// Configured path, or the per-user default
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(densex_search::default_index_path)
    }
}

/// Negative and non-finite values become zero and fail policy validation
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
