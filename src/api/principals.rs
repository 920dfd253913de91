//! Principal directory. Superadmins only.

use axum::{Json, extract::State, response::IntoResponse};

use super::ProtectedState;
use crate::auth::{Auth, SessionDescriptor, SuperadminOnly};

/// List every principal known to the credential store.
pub async fn list(
    State(state): State<ProtectedState>,
    _auth: Auth<SuperadminOnly>,
) -> impl IntoResponse {
    let principals: Vec<SessionDescriptor> = state
        .store
        .list()
        .iter()
        .map(SessionDescriptor::from)
        .collect();

    Json(principals)
}
