//! Auth API endpoints.

use crate::auth::middleware::{extract_bearer, AppState, Identity};
use crate::auth::session::IssuedToken;
use crate::auth::verify::{validate_password, validate_username};
use crate::error::{AppError, AuthError};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use zeroize::Zeroizing;

fn token_response(issued: IssuedToken) -> Json<AuthResponse> {
    Json(AuthResponse {
        token_type: "Bearer",
        expires_at: issued.expires_at(),
        username: issued.claims.sub,
        token: issued.token,
    })
}

/// POST /auth/login: Exchange credentials for a token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let secret = Zeroizing::new(req.password);

    // Same shape rules as registration; no account can exist outside them.
    validate_username(&req.username)?;
    validate_password(&secret)?;

    let issued = state.authority.login(&req.username, secret).await?;
    Ok(token_response(issued))
}

/// POST /auth/register: Create a USER account
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let secret = Zeroizing::new(req.password);

    validate_username(&req.username)?;
    validate_password(&secret)?;

    let issued = state.authority.register(&req.username, secret).await?;
    Ok(token_response(issued))
}

/// POST /auth/refresh: Trade a still-valid token for a new one
///
/// The presented token is revoked; using it again fails.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = extract_bearer(&headers)?.ok_or(AuthError::Unauthorized)?;
    let issued = state.authority.refresh(&token).await?;
    Ok(token_response(issued))
}

/// POST /auth/logout: Revoke the presented token
pub async fn logout(
    Identity(identity): Identity,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.authority.revoke_validated(&identity.claims).await?;
    Ok(StatusCode::NO_CONTENT)
}
