//! Administrative tooling: role assignment.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::put;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::error::AuthError;
use crate::identity::{SubjectId, bearer_token};
use crate::profile::Role;

#[derive(Debug, Deserialize)]
struct RoleUpdate {
    /// `null` (or absent) clears the role.
    role: Option<Role>,
}

pub(super) fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/profiles/{subject}/role", put(set_role))
        .with_state(state)
}

/// PUT /api/admin/profiles/{subject}/role
///
/// The caller's own stored profile must carry the admin role. Live sessions
/// of the target pick the change up from the store's change feed.
async fn set_role(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    headers: HeaderMap,
    body: Result<Json<RoleUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = state.verifier.verify(bearer_token(&headers)?)?;
    let caller_role = state
        .store
        .get(&caller.subject)
        .await?
        .and_then(|profile| profile.role);
    if caller_role != Some(Role::Admin) {
        return Err(AuthError::Forbidden.into());
    }

    let target = SubjectId::new(subject)
        .ok_or_else(|| ApiError::BadRequest("subject must not be empty".to_string()))?;
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let profile = state.store.set_role(&target, update.role).await?;
    info!(
        admin = %caller.subject,
        subject = %target,
        role = ?update.role,
        "Role updated"
    );
    Ok(Json(profile))
}
