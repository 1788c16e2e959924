//! OpenRouter - Multi-provider LLM Gateway
//!
//! Single-attempt HTTP provider for OpenRouter's OpenAI-compatible
//! `/chat/completions` endpoint. Retries and cost accounting are added by
//! [`crate::OpenRouterClient`].

use crate::completion::{Completion, CompletionProvider, TokenUsage};
use crate::error::{Error, Result};
use crate::util::mask_api_key;
use densex_core::RetryPolicy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::instrument;

// ============================================================================
// Constants
// ============================================================================

/// OpenRouter API base URL
pub const BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Sanitize API error messages
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("invalid key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }

    if lower.contains("rate limit") || lower.contains("quota") {
        return "API rate limit exceeded. Please try again later.".to_string();
    }

    if error.len() < 100 {
        return error.to_string();
    }

    "An API error occurred. Please try again.".to_string()
}

// ============================================================================
// Configuration
// ============================================================================

/// OpenRouter provider configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Model
    pub model: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Attempts per completion
    pub retries: u32,
    /// Backoff before the second attempt
    pub base_delay: Duration,
    /// Price per thousand tokens
    pub price_per_1k: f64,
    /// Completion token cap
    pub max_tokens: Option<u32>,
    /// App name (for OpenRouter analytics)
    pub app_name: Option<String>,
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("price_per_1k", &self.price_per_1k)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl OpenRouterConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            retries: 3,
            base_delay: Duration::from_secs(1),
            price_per_1k: 0.0,
            max_tokens: None,
            app_name: Some("Densex".to_string()),
        }
    }

    /// Create from `OPENROUTER_*` environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::NotConfigured("OPENROUTER_API_KEY not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("OPENROUTER_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.model = model;
        }
        if let Ok(price) = std::env::var("OPENROUTER_PRICE_PER_1K") {
            config.price_per_1k = price.trim().parse().map_err(|_| {
                Error::NotConfigured(format!("OPENROUTER_PRICE_PER_1K is not a number: {price}"))
            })?;
        }
        Ok(config)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of attempts
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the price per thousand tokens
    #[must_use]
    pub fn with_price_per_1k(mut self, price: f64) -> Self {
        self.price_per_1k = price;
        self
    }

    /// Set the completion token cap
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Retry policy for completions
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.base_delay, self.timeout)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenRouterMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenRouterChoice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenRouterError {
    error: OpenRouterErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenRouterErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenRouter LLM provider
#[derive(Debug)]
pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env()?)
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenRouterProvider {
    #[instrument(skip(self, prompt), fields(model = %self.config.model))]
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = OpenRouterRequest {
            model: &self.config.model,
            messages: vec![OpenRouterMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            max_tokens: self.config.max_tokens,
        };

        let mut request = self.client.post(&url).bearer_auth(&self.config.api_key);
        if let Some(app_name) = &self.config.app_name {
            request = request.header("X-Title", app_name);
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenRouterError>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(Error::Api(sanitize_api_error(&message)));
        }

        let parsed: OpenRouterResponse =
            serde_json::from_str(&text).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_string()))?;
        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            usage,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}
