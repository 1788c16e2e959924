//! Web API module for Densex
//!
//! Provides:
//! - Health check
//! - Chat page and chat endpoint
//! - Usage totals from the cost ledger

pub mod chat;
pub mod health;
pub mod usage;

use axum::Router;

pub use chat::chat_routes;
pub use health::health_routes;
pub use usage::usage_routes;

/// Create the router with all endpoints; handlers expect
/// `Extension<Arc<ChatPipeline>>` and `Extension<Arc<UsageLedger>>`
pub fn router() -> Router {
    Router::new()
        .merge(health_routes())
        .merge(chat_routes())
        .merge(usage_routes())
}
