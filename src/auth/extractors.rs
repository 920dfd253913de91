//! Request authenticator: bearer token validation for protected endpoints.
//!
//! Two entry points share the same core: the [`require_auth`] middleware gates
//! a whole router and stores the [`PrincipalContext`] in request extensions,
//! and the [`Auth`] extractor hands that context (plus a role check) to a
//! handler.

use std::marker::PhantomData;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::PrincipalContext;
use crate::credentials::Role;
use crate::jwt::JwtConfig;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Core authentication logic: bearer header -> validated principal context.
pub fn authenticate(headers: &HeaderMap, jwt: &JwtConfig) -> Result<PrincipalContext, AuthErrorKind> {
    let token = bearer_token(headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    jwt.validate_access(token).map_err(|e| {
        // Full reason stays server-side.
        debug!(error = %e, "Rejected access token");
        AuthErrorKind::InvalidToken
    })
}

/// Middleware rejecting unauthenticated requests with 401 and attaching the
/// principal context to the request for downstream handlers.
pub async fn require_auth<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let principal = authenticate(request.headers(), state.jwt())
        .map_err(|kind| ApiAuthError::new(kind, state.secure_cookies()))?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

// =============================================================================
// Role constraints
// =============================================================================

/// Role check applied on top of authentication.
pub trait RoleConstraint: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// Any authenticated principal.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: Role) -> bool {
        true
    }
}

/// Superadmins only.
pub struct SuperadminOnly;

impl RoleConstraint for SuperadminOnly {
    fn allows(role: Role) -> bool {
        role == Role::Superadmin
    }
}

/// Extractor for handlers that need the authenticated principal.
///
/// Reuses the context stored by [`require_auth`] when the route is behind it,
/// otherwise authenticates the request itself.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub principal: PrincipalContext,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = match parts.extensions.get::<PrincipalContext>() {
            Some(principal) => principal.clone(),
            None => {
                let principal = authenticate(&parts.headers, state.jwt())
                    .map_err(|kind| ApiAuthError::new(kind, state.secure_cookies()))?;
                parts.extensions.insert(principal.clone());
                principal
            }
        };

        if !R::allows(principal.role) {
            debug!(principal = %principal.principal_id, role = principal.role.as_str(), "Role not admitted");
            return Err(ApiAuthError::new(
                AuthErrorKind::InsufficientRole,
                state.secure_cookies(),
            ));
        }

        Ok(Auth {
            principal,
            _role: PhantomData,
        })
    }
}
