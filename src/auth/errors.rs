//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::SessionCookies;

/// Internal auth error kind used by the core authentication logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No bearer credential on the request.
    NotAuthenticated,
    /// Bearer credential present but expired or forged.
    InvalidToken,
    /// Authenticated, but the role constraint does not admit the principal.
    InsufficientRole,
}

/// Uniform JSON error body: `{"error": {"message": "..."}}`.
#[derive(Serialize)]
pub struct ErrorBody<'a> {
    pub error: ErrorMessage<'a>,
}

#[derive(Serialize)]
pub struct ErrorMessage<'a> {
    pub message: &'a str,
}

impl<'a> ErrorBody<'a> {
    pub fn new(message: &'a str) -> Self {
        Self {
            error: ErrorMessage { message },
        }
    }
}

/// API authentication error. Rejections clear the session cookies.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    pub(super) secure_cookies: bool,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        // Missing, expired and forged tokens all read the same to the caller.
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => "Not authenticated",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody::new(self.message()));

        if self.status_code() == StatusCode::UNAUTHORIZED {
            let clear = SessionCookies::new(self.secure_cookies).clear();
            (self.status_code(), clear, body).into_response()
        } else {
            (self.status_code(), body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    async fn body_of(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_expired_and_missing_are_indistinguishable() {
        let missing = ApiAuthError::new(AuthErrorKind::NotAuthenticated, false).into_response();
        let invalid = ApiAuthError::new(AuthErrorKind::InvalidToken, false).into_response();

        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(missing).await, body_of(invalid).await);
    }

    #[tokio::test]
    async fn test_unauthorized_clears_cookies() {
        let response = ApiAuthError::new(AuthErrorKind::InvalidToken, false).into_response();
        let cleared = response.headers().get_all(header::SET_COOKIE).iter().count();
        assert_eq!(cleared, 3);

        let json = body_of(response).await;
        assert_eq!(json["error"]["message"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_forbidden_keeps_cookies() {
        let response = ApiAuthError::new(AuthErrorKind::InsufficientRole, false).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
