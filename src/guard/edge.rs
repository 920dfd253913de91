//! Edge evaluation point: runs before any page is rendered.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::{GuardDecision, RoutePolicy};
use crate::auth::SessionCookies;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct EdgeState {
    pub policy: Arc<RoutePolicy>,
    pub jwt: Arc<JwtConfig>,
}

/// A session counts as present at the edge when both the access token and
/// descriptor cookies exist and the access token still validates.
pub fn session_present(headers: &axum::http::HeaderMap, jwt: &JwtConfig) -> bool {
    let snapshot = SessionCookies::read(headers);
    if !snapshot.is_present() {
        return false;
    }
    snapshot
        .access_token
        .as_deref()
        .is_some_and(|token| jwt.validate_access(token).is_ok())
}

/// Middleware applying the route policy to page navigations.
pub async fn edge_guard(State(state): State<EdgeState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let present = session_present(request.headers(), &state.jwt);

    match state.policy.evaluate(&path, present) {
        GuardDecision::Allow => next.run(request).await,
        decision => {
            let location = decision.location().unwrap_or(state.policy.login_path());
            debug!(path = %path, location = %location, "Edge guard redirect");
            Redirect::temporary(location).into_response()
        }
    }
}
