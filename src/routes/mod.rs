//! API route handlers.

pub mod admin;
pub mod auth;
pub mod user;

use crate::auth::middleware::{request_gate, AppState};
use crate::error::AppError;
use crate::middleware::security_headers;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// Length of generated account ids.
pub const USER_ID_LEN: usize = 12;

/// Validate that a string is a valid nanoid (alphanumeric, hyphens, underscores).
pub fn validate_id(id: &str, label: &str, expected_len: usize) -> Result<(), AppError> {
    if id.len() != expected_len
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::BadRequest(format!("Invalid {} format", label)));
    }
    Ok(())
}

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(user::health))
        // Auth endpoints
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        // User endpoints
        .route("/api/users/me", get(user::me))
        // Admin endpoints
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}",
            get(admin::get_user).delete(admin::delete_user),
        )
        .route("/api/admin/users/{id}/admin", post(admin::make_admin))
        .route("/api/admin/keys/rotate", post(admin::rotate_key))
}

/// The complete application: routes behind the request gate, CORS and security headers.
pub fn app(state: AppState) -> Router {
    // Explicit CORS: deny all cross-origin requests.
    // CorsLayer::new() with no allowed origins rejects all CORS preflight requests.
    let cors = CorsLayer::new();

    api_router()
        .layer(middleware::from_fn_with_state(state.clone(), request_gate))
        .layer(cors)
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("abcDEF012_-x", "user ID", USER_ID_LEN).is_ok());
        assert!(validate_id("short", "user ID", USER_ID_LEN).is_err());
        assert!(validate_id("abcDEF012_-!", "user ID", USER_ID_LEN).is_err());
        assert!(validate_id("../../etc/pa", "user ID", USER_ID_LEN).is_err());
    }
}
