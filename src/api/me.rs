//! Endpoints describing the caller's own session.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

use super::{ApiError, ProtectedState};
use crate::auth::{Auth, PrincipalContext};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub context: PrincipalContext,
    pub name: String,
    pub email: String,
}

/// Return the authenticated principal.
pub async fn me(
    State(state): State<ProtectedState>,
    auth: Auth,
) -> Result<Json<MeResponse>, ApiError> {
    // The token outlives the record if the principal was removed
    let Some(record) = state.store.find_by_id(&auth.principal.principal_id) else {
        warn!(principal = %auth.principal.principal_id, "Valid token for unknown principal");
        return Err(ApiError::not_found("Principal not found"));
    };

    Ok(Json(MeResponse {
        context: auth.principal,
        name: record.name,
        email: record.email,
    }))
}

/// Lightweight check that the current access token is still accepted.
pub async fn verify(_auth: Auth) -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
