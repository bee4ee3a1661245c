//! Admin API endpoints (all require AdminIdentity).

use crate::auth::middleware::{AdminIdentity, AppState};
use crate::error::AppError;
use crate::models::{ListUsersQuery, Role, RotateKeyResponse, UserInfo, UserPage};
use crate::storage::bounded;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// GET /api/admin/users: List accounts, optionally by role, one page at a time
///
/// Pages are zero-based.
pub async fn list_users(
    AdminIdentity(_identity): AdminIdentity,
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::BadRequest(format!(
            "Page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let users = bounded(
        state.config.store_timeout,
        state.accounts.list_users(query.role),
    )
    .await?;
    let total = users.len();

    let items: Vec<UserInfo> = users
        .into_iter()
        .skip(page.saturating_mul(size))
        .take(size)
        .map(UserInfo::from)
        .collect();

    Ok(Json(UserPage {
        items,
        page,
        size,
        total,
    }))
}

/// GET /api/admin/users/{id}: One account
pub async fn get_user(
    AdminIdentity(_identity): AdminIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    super::validate_id(&id, "user ID", super::USER_ID_LEN)?;

    let user = bounded(state.config.store_timeout, state.accounts.find_by_id(&id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

    Ok(Json(UserInfo::from(user)))
}

/// POST /api/admin/users/{id}/admin: Promote an account to ADMIN
///
/// Takes effect from the account's next login.
pub async fn make_admin(
    AdminIdentity(identity): AdminIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    super::validate_id(&id, "user ID", super::USER_ID_LEN)?;

    let now = state.clock.now();
    let user = bounded(
        state.config.store_timeout,
        state.accounts.update_role(&id, Role::Admin, now),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

    tracing::warn!(action = "user_promoted", user_id = %user.id, by = %identity.user_id, "Admin granted ADMIN role");

    Ok(Json(UserInfo::from(user)))
}

/// DELETE /api/admin/users/{id}: Delete an account
///
/// Every outstanding token of the account is revoked.
pub async fn delete_user(
    AdminIdentity(identity): AdminIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    super::validate_id(&id, "user ID", super::USER_ID_LEN)?;

    // Don't allow an admin to lock themselves out
    if id == identity.user_id {
        return Err(AppError::Forbidden(
            "Cannot delete your own account".to_string(),
        ));
    }

    let found = bounded(state.config.store_timeout, state.accounts.find_by_id(&id)).await?;
    if found.is_none() {
        return Err(AppError::NotFound(format!("User with id {} not found", id)));
    }

    // Tokens go first: if revoking fails the account stays and the delete can be retried.
    state
        .authority
        .revoke_subject(&id)
        .await
        .map_err(|e| AppError::Internal(format!("Revoking tokens of {}: {}", id, e)))?;

    let deleted = bounded(state.config.store_timeout, state.accounts.delete_user(&id)).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("User with id {} not found", id)));
    }

    tracing::warn!(action = "user_deleted", user_id = %id, by = %identity.user_id, "Admin deleted user");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/keys/rotate: Replace the signing key
///
/// Tokens signed with the previous key keep working for the grace period.
pub async fn rotate_key(
    AdminIdentity(identity): AdminIdentity,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let keys = state.codec().keys();
    let kid = keys.rotate(state.clock.now());

    tracing::warn!(
        action = "key_rotated",
        kid = %kid,
        grace_secs = keys.grace_secs(),
        by = %identity.user_id,
        "Signing key rotated"
    );

    Ok(Json(RotateKeyResponse { kid }))
}
