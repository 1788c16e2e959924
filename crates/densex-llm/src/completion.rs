//! Completions with retry and cost accounting
//!
//! `OpenRouterClient::complete` runs one prompt through a
//! [`CompletionProvider`] under a retry policy, then charges the token
//! usage to the usage ledger under [`USAGE_KEY`].

use crate::error::{Error, Result};
use crate::openrouter::{OpenRouterConfig, OpenRouterProvider};
use async_trait::async_trait;
use densex_core::{RetryExecutor, RetryPolicy, UsageLedger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Ledger key completion costs are recorded under
pub const USAGE_KEY: &str = "openrouter";

/// Token usage reported by the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Completion text plus usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Model that served the request
    pub model: String,
}

/// A single-attempt completion backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`
    async fn complete(&self, prompt: &str) -> Result<Completion>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Retried, cost-accounted completion client
#[derive(Clone)]
pub struct OpenRouterClient {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
    executor: RetryExecutor,
    ledger: Option<Arc<UsageLedger>>,
    price_per_1k: f64,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .field("price_per_1k", &self.price_per_1k)
            .field("ledger", &self.ledger.is_some())
            .finish()
    }
}

impl OpenRouterClient {
    /// Client over any provider; 3 attempts, 30 s timeout, 1 s base delay, no ledger
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
            executor: RetryExecutor::new(),
            ledger: None,
            price_per_1k: 0.0,
        }
    }

    /// Client for the OpenRouter gateway described by `config`
    pub fn from_config(config: OpenRouterConfig) -> Result<Self> {
        let policy = config.policy();
        let price = config.price_per_1k;
        let provider = OpenRouterProvider::new(config)?;
        let mut client = Self::new(Arc::new(provider)).with_policy(policy);
        client.price_per_1k = price;
        Ok(client)
    }

    /// Charge usage to `ledger` at `price_per_1k` per thousand tokens
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>, price_per_1k: f64) -> Self {
        self.ledger = Some(ledger);
        self.price_per_1k = price_per_1k;
        self
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

    /// Cost of `usage` at the configured price
    #[must_use]
    pub fn cost_of(&self, usage: &TokenUsage) -> f64 {
        f64::from(usage.total_tokens) / 1000.0 * self.price_per_1k
    }

    /// Complete `prompt`.
    ///
    /// When a ledger is attached the cost is recorded after a successful
    /// completion; a budget breach is returned as an error even though the
    /// completion itself succeeded.
    #[instrument(skip(self, prompt), fields(provider = %self.provider.name()))]
    pub async fn complete(&self, prompt: &str) -> Result<Completion> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt must be non-empty".to_string()));
        }

        let provider = &self.provider;
        let completion = self
            .executor
            .execute(&self.policy, || provider.complete(prompt))
            .await
            .map_err(Error::Completion)?;

        if let Some(ledger) = &self.ledger {
            let cost = self.cost_of(&completion.usage);
            ledger.record(USAGE_KEY, cost).await?;
        }

        debug!(
            model = %completion.model,
            total_tokens = completion.usage.total_tokens,
            "completion received"
        );
        Ok(completion)
    }
}
