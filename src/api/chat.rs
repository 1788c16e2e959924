//! Chat endpoints
//!
//! - `GET /`: minimal chat page
//! - `POST /api/chat`: `{"message"}` → `{"reply", "context"?, "citation"?}`

use crate::chat::{ChatError, ChatPipeline, ChatReply};
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use densex_llm::util::sanitize_error_for_user;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User's question
    pub message: String,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Sanitized failure message
    pub error: String,
}

/// Chat failure as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = if err.is_budget_exceeded() {
            StatusCode::PAYMENT_REQUIRED
        } else if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };

        if status == StatusCode::BAD_GATEWAY {
            error!(error = ?err, "chat request failed");
        } else {
            warn!(error = %err, "chat request rejected");
        }

        Self {
            status,
            message: sanitize_error_for_user(&err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn post_chat(
    Extension(pipeline): Extension<Arc<ChatPipeline>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let reply = pipeline.handle_message(&request.message).await?;
    Ok(Json(reply))
}

pub fn chat_routes() -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/chat", post(post_chat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use densex_core::{LedgerError, RetryError};

    #[test]
    fn test_budget_exceeded_is_payment_required() {
        let err = ChatError::Model(densex_llm::Error::Usage(LedgerError::BudgetExceeded {
            service: "openrouter".to_string(),
            total: 151.0,
            limit: 150.0,
        }));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(api.message, "openrouter cost 151.00 exceeds $150.00");
    }

    #[test]
    fn test_upsert_budget_from_search_is_payment_required() {
        let err = ChatError::Search(densex_search::Error::Usage(LedgerError::BudgetExceeded {
            service: "pinecone".to_string(),
            total: 2.0,
            limit: 1.0,
        }));
        assert_eq!(ApiError::from(err).status, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_blank_message_is_bad_request() {
        let api = ApiError::from(ChatError::EmptyMessage);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "message must be non-empty");
    }

    #[test]
    fn test_upstream_failure_is_bad_gateway() {
        let err = ChatError::Model(densex_llm::Error::Embedding(RetryError::InvalidParameters {
            reason: "max_attempts must be at least 1",
        }));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.message, "embedding failed");
    }

    #[test]
    fn test_sensitive_messages_are_sanitized() {
        let err = ChatError::Model(densex_llm::Error::Api(
            "Invalid api_key provided: sk-or-123".to_string(),
        ));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(!api.message.contains("sk-or-123"));
    }

    #[test]
    fn test_chat_request_reads_message() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "Where was it signed?"}"#).unwrap();
        assert_eq!(request.message, "Where was it signed?");
        assert!(serde_json::from_str::<ChatRequest>("{}").is_err());
    }

    #[tokio::test]
    async fn test_index_page_has_chat_form() {
        let Html(page) = index_page().await;
        assert!(page.contains("/api/chat"));
    }
}
