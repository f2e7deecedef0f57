//! Error types for the image cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the image cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A URL that cannot be turned into a resource key
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// A persistent store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The origin could not be reached and nothing was cached
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Storage(format!("serialization failed: {}", err))
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        CacheError::InvalidKey(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CacheError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CacheError::InvalidKey(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CacheError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            CacheError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            CacheError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(ErrorResponse::new(message));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the image cache.
pub type Result<T> = std::result::Result<T, CacheError>;
