//! Session endpoints.
//!
//! - POST `/login` - Exchange sealed credentials for a session
//! - POST `/refresh` - Exchange the refresh cookie for a new access token
//! - POST `/logout` - Clear the session cookies

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{SessionCookies, SessionDescriptor};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::credentials::{CredentialStore, Principal};
use crate::envelope::{EnvelopeCipher, EnvelopeError};
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct SessionState {
    pub jwt: Arc<JwtConfig>,
    pub cipher: Arc<EnvelopeCipher>,
    pub store: Arc<dyn CredentialStore>,
    pub secure_cookies: bool,
}

pub fn router(rate_limit: Arc<RateLimitConfig>) -> Router<SessionState> {
    Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(rate_limit, rate_limit_login)),
        )
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

/// Body of the login request: an envelope sealing [`LoginCredentials`].
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub envelope: String,
}

/// Plaintext inside the login envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub principal: Principal,
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub access_token: String,
}

/// Response envelope used by every session endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthEnvelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> AuthEnvelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Failure of a session endpoint. 401s also clear the session cookies.
#[derive(Debug)]
pub struct AuthFailure {
    status: StatusCode,
    message: &'static str,
    secure_cookies: bool,
}

impl AuthFailure {
    pub fn new(status: StatusCode, message: &'static str, secure_cookies: bool) -> Self {
        Self {
            status,
            message,
            secure_cookies,
        }
    }

    fn bad_request(secure_cookies: bool) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request", secure_cookies)
    }

    fn internal(secure_cookies: bool) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            secure_cookies,
        )
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let body = Json(AuthEnvelope::<()> {
            success: false,
            message: self.message.to_string(),
            data: None,
        });

        if self.status == StatusCode::UNAUTHORIZED {
            let clear = SessionCookies::new(self.secure_cookies).clear();
            (self.status, clear, body).into_response()
        } else {
            (self.status, body).into_response()
        }
    }
}

/// Open the sealed credentials, verify them, and start a session.
async fn login(
    State(state): State<SessionState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AuthFailure> {
    let secure = state.secure_cookies;

    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Malformed login request");
        AuthFailure::bad_request(secure)
    })?;

    let credentials: LoginCredentials = state.cipher.open(&request.envelope).map_err(|e| {
        match &e {
            EnvelopeError::Parse(_) => warn!(error = %e, "Login envelope is not valid credentials"),
            _ => warn!(error = %e, "Failed to open login envelope"),
        }
        AuthFailure::bad_request(secure)
    })?;

    let Some(principal) = state
        .store
        .verify(&credentials.identifier, &credentials.secret)
    else {
        info!(identifier = %credentials.identifier, "Login rejected");
        return Err(AuthFailure::new(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            secure,
        ));
    };

    let tokens = state.jwt.issue(&principal).map_err(|e| {
        error!(error = %e, "Failed to issue tokens");
        AuthFailure::internal(secure)
    })?;

    let descriptor = SessionDescriptor::from(&principal);
    let cookies = SessionCookies::new(secure).persist(&tokens.access, &tokens.refresh, &descriptor);

    info!(principal = %principal.id, role = principal.role.as_str(), "Login succeeded");

    Ok((
        StatusCode::OK,
        cookies,
        Json(AuthEnvelope::ok(
            "Login successful",
            LoginData {
                principal,
                access_token: tokens.access.token,
            },
        )),
    )
        .into_response())
}

/// Mint a new access token from the refresh cookie. The refresh token itself
/// is not rotated.
async fn refresh(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<Response, AuthFailure> {
    let secure = state.secure_cookies;
    let relogin = || {
        AuthFailure::new(
            StatusCode::UNAUTHORIZED,
            "Session expired, please sign in again",
            secure,
        )
    };

    let token = SessionCookies::refresh_token(&headers).ok_or_else(relogin)?;

    let principal_id = state.jwt.validate_refresh(token).map_err(|e| {
        warn!(error = %e, "Rejected refresh token");
        relogin()
    })?;

    let principal = state.store.find_by_id(&principal_id).ok_or_else(|| {
        warn!(principal = %principal_id, "Refresh for unknown principal");
        relogin()
    })?;

    let access = state
        .jwt
        .generate_access_token(&principal.id, principal.role)
        .map_err(|e| {
            error!(error = %e, "Failed to generate access token");
            AuthFailure::internal(secure)
        })?;

    let cookies = SessionCookies::new(secure).persist_access(&access);

    Ok((
        StatusCode::OK,
        cookies,
        Json(AuthEnvelope::ok(
            "Token refreshed",
            RefreshData {
                access_token: access.token,
            },
        )),
    )
        .into_response())
}

/// Best-effort acknowledgment; always clears the cookies.
async fn logout(State(state): State<SessionState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = SessionCookies::refresh_token(&headers) {
        if let Ok(principal_id) = state.jwt.validate_refresh(token) {
            info!(principal = %principal_id, "Logout");
        }
    }

    (
        StatusCode::OK,
        SessionCookies::new(state.secure_cookies).clear(),
        Json(AuthEnvelope::<()> {
            success: true,
            message: "Logged out".to_string(),
            data: None,
        }),
    )
}
