//! API error handling
//!
//! Structured error responses with proper HTTP status codes and request
//! tracking. Domain errors carry their own mapping; the envelope shape is
//! the same for every failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::errors::GameError;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, VALIDATION_FAILED, CONCURRENT_UPDATE, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (can be any JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A domain error tagged with the request it failed.
#[derive(Debug)]
pub struct ApiError {
    pub request_id: String,
    pub error: GameError,
}

impl ApiError {
    pub fn new(request_id: impl Into<String>, error: GameError) -> Self {
        Self {
            request_id: request_id.into(),
            error,
        }
    }

    pub fn bad_request(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(request_id, GameError::validation(message))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.error {
            GameError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            GameError::InsufficientBalance { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
            }
            GameError::ActiveGameExists { .. } => (StatusCode::BAD_REQUEST, "ACTIVE_GAME_EXISTS"),
            GameError::InvalidState(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            GameError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            GameError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            GameError::ConcurrencyConflict => (StatusCode::CONFLICT, "CONCURRENT_UPDATE"),
            GameError::PersistenceFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.error {
            GameError::InsufficientBalance {
                required,
                available,
            } => Some(json!({ "required": required, "available": available })),
            GameError::ActiveGameExists { game_id } => Some(json!({ "game_id": game_id })),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.request_id, self.error)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, "Request failed");
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: self.error.to_string(),
                details: self.details(),
            },
        });

        (status, body).into_response()
    }
}
