//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::auth::ErrorBody;

/// API error type with automatic response conversion.
///
/// Renders the same `{"error": {"message": ...}}` body as authentication
/// failures. Authentication and role failures themselves go through
/// [`crate::auth::ApiAuthError`].
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::NotFound(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::new(self.message()))).into_response()
    }
}
