//! Error types and Axum response conversions.

use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Client-facing message for every authentication failure.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";

/// Authentication and authorization failures.
///
/// The variants are for logs and control flow only. Clients see a single
/// generic message for all of them except `Forbidden`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("bad credentials")]
    AuthFailed,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token")]
    Malformed,

    #[error("insufficient privilege")]
    Forbidden,

    #[error("no valid identity")]
    Unauthorized,

    /// A store lookup failed or timed out. Treated as a failed authentication.
    #[error("auth store unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::AuthFailed => "auth_failed",
            AuthError::Expired => "expired",
            AuthError::Revoked => "revoked",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Malformed => "malformed",
            AuthError::Forbidden => "forbidden",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden => AppError::Forbidden("Access denied".to_string()),
            other => {
                tracing::warn!(action = "auth_rejected", kind = other.kind(), detail = %other, "Authentication rejected");
                AppError::Unauthorized(AUTH_FAILED_MESSAGE.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Store error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::time::Duration;

    /// Extract status code and JSON body from an AppError response.
    async fn error_response(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let (status, body) = error_response(AppError::Internal(
            "Redis connection refused at 10.0.0.5:6379".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_auth_errors_are_uniform() {
        for err in [
            AuthError::AuthFailed,
            AuthError::Expired,
            AuthError::Revoked,
            AuthError::InvalidSignature,
            AuthError::Malformed,
            AuthError::Unauthorized,
            AuthError::Unavailable("timeout".to_string()),
        ] {
            let (status, body) = error_response(AppError::from(err)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], AUTH_FAILED_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_403() {
        let (status, body) = error_response(AppError::from(AuthError::Forbidden)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");
    }

    #[tokio::test]
    async fn test_conflict() {
        let (status, body) =
            error_response(AppError::Conflict("Username is already taken".to_string())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Username is already taken");
    }

    #[tokio::test]
    async fn test_not_found() {
        let (status, body) = error_response(AppError::NotFound("User not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
    }

    #[test]
    fn test_store_timeout_becomes_unavailable() {
        let err = AuthError::from(StoreError::Timeout(Duration::from_millis(500)));
        assert!(matches!(err, AuthError::Unavailable(_)));
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        match AppError::from(serde_err) {
            AppError::Internal(msg) => assert!(msg.contains("JSON error")),
            _ => panic!("Expected Internal variant"),
        }
    }
}
