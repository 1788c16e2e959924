//! Remote usage dashboard
//!
//! Each committed record is mirrored as a JSON POST of
//! `{"service", "cost", "total"}`. Any non-2xx response is a failure.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use super::record::CostRecord;

/// Failure of a single dashboard delivery
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Transport failure
    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("dashboard returned HTTP {0}")]
    Status(u16),
}

/// Destination for mirrored cost records
#[async_trait]
pub trait DashboardReporter: Send + Sync + fmt::Debug {
    /// Deliver one record (one attempt; the ledger retries)
    async fn report(&self, record: &CostRecord) -> Result<(), DashboardError>;
}

/// Dashboard reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpDashboard {
    client: reqwest::Client,
    url: String,
}

impl HttpDashboard {
    /// Dashboard posting to `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DashboardReporter for HttpDashboard {
    async fn report(&self, record: &CostRecord) -> Result<(), DashboardError> {
        let payload = serde_json::json!({
            "service": record.service,
            "cost": record.cost,
            "total": record.total,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DashboardError::Status(response.status().as_u16()))
        }
    }
}
