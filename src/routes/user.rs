//! Health and self-service endpoints.

use crate::auth::middleware::{AppState, Identity};
use crate::error::AppError;
use crate::models::UserInfo;
use crate::storage::bounded;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// GET /health: Liveness check
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/users/me: The caller's account
pub async fn me(
    Identity(identity): Identity,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = bounded(
        state.config.store_timeout,
        state.accounts.find_by_id(&identity.user_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserInfo::from(user)))
}
