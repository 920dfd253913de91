mod error;
mod me;
mod principals;
mod session;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;

use crate::auth::require_auth;
use crate::credentials::CredentialStore;
use crate::envelope::EnvelopeCipher;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;
pub use session::{
    AuthEnvelope, AuthFailure, LoginCredentials, LoginData, LoginRequest, RefreshData,
    SessionState,
};

/// State for endpoints behind the request authenticator.
#[derive(Clone)]
pub struct ProtectedState {
    pub jwt: Arc<JwtConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(ProtectedState);

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Create the API router.
pub fn create_api_router(
    jwt: Arc<JwtConfig>,
    cipher: Arc<EnvelopeCipher>,
    store: Arc<dyn CredentialStore>,
    secure_cookies: bool,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let session_state = SessionState {
        jwt: jwt.clone(),
        cipher,
        store: store.clone(),
        secure_cookies,
    };

    let protected_state = ProtectedState {
        jwt,
        store,
        secure_cookies,
    };

    let protected = Router::new()
        .route("/me", get(me::me))
        .route("/verify", get(me::verify))
        .route("/principals", get(principals::list))
        .route_layer(middleware::from_fn_with_state(
            protected_state.clone(),
            require_auth::<ProtectedState>,
        ))
        .with_state(protected_state);

    Router::new()
        .nest("/auth", session::router(rate_limit).with_state(session_state))
        .merge(protected)
        .fallback(not_found)
}
