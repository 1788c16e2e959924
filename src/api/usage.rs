//! Usage API endpoint
//!
//! GET /api/usage: per-service running totals and the alert limit.

use axum::extract::Extension;
use axum::{routing::get, Json, Router};
use densex_core::{UsageLedger, UsageSnapshot};
use serde::Serialize;
use std::sync::Arc;

/// Response for GET /api/usage
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub snapshot: UsageSnapshot,
    /// Keys at or above the alert limit
    pub over_limit: Vec<String>,
}

impl From<UsageSnapshot> for UsageResponse {
    fn from(snapshot: UsageSnapshot) -> Self {
        let over_limit = snapshot.over_limit().into_iter().map(str::to_string).collect();
        Self {
            snapshot,
            over_limit,
        }
    }
}

async fn get_usage(Extension(ledger): Extension<Arc<UsageLedger>>) -> Json<UsageResponse> {
    Json(ledger.snapshot().await.into())
}

pub fn usage_routes() -> Router {
    Router::new().route("/api/usage", get(get_usage))
}
