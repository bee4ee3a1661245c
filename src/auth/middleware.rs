//! The request gate and the extractors handlers read identities through.
//!
//! Every request passes [`request_gate`] before reaching a handler. The gate
//! runs four stages in order: classify the route against the [`RoutePolicy`],
//! extract the bearer token, validate it, then authorize the identity against
//! the route's requirement. On success the validated [`IdentityContext`] is
//! stored in the request extensions, where [`Identity`] and [`AdminIdentity`]
//! pick it up.

use super::clock::Clock;
use super::keys::{KeyError, KeyRing, SigningKey};
use super::policy::{Access, RoutePolicy};
use super::session::SessionAuthority;
use super::token::{Claims, TokenCodec};
use super::verify::{CredentialVerifier, SecretHasher, VerifyError};
use crate::config::Config;
use crate::error::{AppError, AuthError};
use crate::models::Role;
use crate::storage::{AccountStore, RevocationStore};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authority: Arc<SessionAuthority>,
    pub accounts: Arc<dyn AccountStore>,
    pub policy: Arc<RoutePolicy>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("signing key: {0}")]
    Key(#[from] KeyError),

    #[error("password hasher: {0}")]
    Hasher(#[from] VerifyError),
}

impl AppState {
    /// Wire the auth components together from configuration and stores.
    pub fn build(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        revocations: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StateError> {
        let key = SigningKey::new(config.jwt_key_id.clone(), config.jwt_secret.to_vec())?;
        let keys = Arc::new(KeyRing::new(key, config.jwt_key_grace_secs));
        let codec = Arc::new(TokenCodec::new(keys, clock.clone()));

        let hasher = SecretHasher::new(config.hash_cost)?;
        let verifier = CredentialVerifier::new(accounts.clone(), hasher, config.store_timeout);

        let authority = Arc::new(SessionAuthority::new(
            codec,
            verifier,
            accounts.clone(),
            revocations,
            clock.clone(),
            config.jwt_expiration_secs,
            config.store_timeout,
        ));

        Ok(Self {
            config: Arc::new(config),
            authority,
            accounts,
            policy: Arc::new(RoutePolicy::standard()),
            clock,
        })
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        self.authority.codec()
    }
}

/// The authenticated caller of one request.
///
/// Lives in the request extensions and is dropped with the request.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub username: String,
    pub user_id: String,
    pub roles: Vec<Role>,
    pub claims: Claims,
}

impl IdentityContext {
    fn from_claims(claims: Claims) -> Self {
        Self {
            username: claims.sub.clone(),
            user_id: claims.uid.clone(),
            roles: claims.roles.clone(),
            claims,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Pull the token out of `Authorization: Bearer {token}`.
///
/// `Ok(None)` when the header is absent; `Malformed` when it is present but
/// not a usable bearer credential.
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(Some(token.to_string()))
}

/// Terminal state of the gate for one request.
enum GateOutcome {
    PublicRouteAllowed(Option<IdentityContext>),
    Authorized(IdentityContext),
    Forbidden(IdentityContext),
    Rejected(AuthError),
}

async fn evaluate(state: &AppState, access: &Access, headers: &HeaderMap) -> GateOutcome {
    if *access == Access::Public {
        // A usable token still identifies the caller; anything else is ignored.
        let identity = match extract_bearer(headers) {
            Ok(Some(token)) => state
                .authority
                .validate(&token)
                .await
                .ok()
                .map(IdentityContext::from_claims),
            _ => None,
        };
        return GateOutcome::PublicRouteAllowed(identity);
    }

    let token = match extract_bearer(headers) {
        Ok(Some(token)) => token,
        Ok(None) => return GateOutcome::Rejected(AuthError::Unauthorized),
        Err(e) => return GateOutcome::Rejected(e),
    };

    let identity = match state.authority.validate(&token).await {
        Ok(claims) => IdentityContext::from_claims(claims),
        Err(e) => return GateOutcome::Rejected(e),
    };

    if access.permits(&identity.roles) {
        GateOutcome::Authorized(identity)
    } else {
        GateOutcome::Forbidden(identity)
    }
}

/// Authenticate and authorize every request against the route policy.
pub async fn request_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let access = state
        .policy
        .classify(request.method(), request.uri().path())
        .clone();

    match evaluate(&state, &access, request.headers()).await {
        GateOutcome::PublicRouteAllowed(identity) => {
            if let Some(identity) = identity {
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
        GateOutcome::Authorized(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        GateOutcome::Forbidden(identity) => {
            tracing::warn!(
                action = "access_denied",
                user_id = %identity.user_id,
                method = %request.method(),
                path = %request.uri().path(),
                "Insufficient privilege"
            );
            AppError::from(AuthError::Forbidden).into_response()
        }
        GateOutcome::Rejected(err) => {
            tracing::debug!(
                method = %request.method(),
                path = %request.uri().path(),
                "Request rejected by gate"
            );
            AppError::from(err).into_response()
        }
    }
}

/// Authenticated identity extractor.
///
/// Reads the context the gate attached to the request.
/// Returns 401 Unauthorized if there is none.
pub struct Identity(pub IdentityContext);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .map(Identity)
            .ok_or_else(|| AppError::from(AuthError::Unauthorized))
    }
}

/// Admin-only identity extractor.
///
/// Returns 403 Forbidden if the caller is not an administrator.
pub struct AdminIdentity(pub IdentityContext);

impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(identity) = Identity::from_request_parts(parts, state).await?;

        if !identity.is_admin() {
            return Err(AppError::from(AuthError::Forbidden));
        }

        Ok(AdminIdentity(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::verify::HashCost;
    use crate::config::StoreBackend;
    use crate::storage::memory::MemoryStore;
    use axum::{
        body::Body,
        http::{header, HeaderValue, Method, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use zeroize::Zeroizing;

    const NOW: u64 = 1_700_000_000;

    fn test_config() -> Config {
        Config {
            jwt_secret: Zeroizing::new(vec![3u8; 32]),
            jwt_key_id: "primary".to_string(),
            jwt_expiration_secs: 3600,
            jwt_key_grace_secs: 3600,
            hash_cost: HashCost {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            store_backend: StoreBackend::Memory,
            store_timeout: Duration::from_millis(200),
            revocation_prune_interval_secs: 60,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            admin_username: None,
            admin_password: None,
        }
    }

    async fn test_state() -> (AppState, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let state = AppState::build(test_config(), store.clone(), store, clock.clone()).unwrap();
        state
            .authority
            .register("alice", Zeroizing::new("alice-password".to_string()))
            .await
            .unwrap();
        state
            .authority
            .ensure_account(
                "root",
                Zeroizing::new("root-password".to_string()),
                Role::Admin,
            )
            .await
            .unwrap();
        (state, clock)
    }

    async fn token_for(state: &AppState, username: &str, password: &str) -> String {
        state
            .authority
            .login(username, Zeroizing::new(password.to_string()))
            .await
            .unwrap()
            .token
    }

    async fn whoami(request: Request) -> String {
        request
            .extensions()
            .get::<IdentityContext>()
            .map_or_else(|| "anonymous".to_string(), |i| i.username.clone())
    }

    async fn admin_only(AdminIdentity(identity): AdminIdentity) -> String {
        identity.username
    }

    async fn me(Identity(identity): Identity) -> String {
        identity.username
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/health", get(whoami))
            .route("/auth/login", post(whoami))
            .route("/api/users/me", get(me))
            .route("/api/admin/ping", get(admin_only))
            .route("/other", get(me))
            .layer(middleware::from_fn_with_state(state.clone(), request_gate))
            .with_state(state)
    }

    async fn call(
        app: Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers).unwrap(), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(
            extract_bearer(&headers).unwrap().as_deref(),
            Some("abc.def.ghi")
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_bearer(&headers).unwrap().as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(extract_bearer(&headers).unwrap_err(), AuthError::Malformed);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers).unwrap_err(), AuthError::Malformed);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(extract_bearer(&headers).unwrap_err(), AuthError::Malformed);
    }

    #[tokio::test]
    async fn test_public_route_without_token() {
        let (state, _) = test_state().await;
        let (status, body) = call(app(state), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_public_route_ignores_bad_token() {
        let (state, _) = test_state().await;
        let (status, body) = call(app(state), Method::GET, "/health", Some("garbage")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_public_route_with_valid_token_sets_identity() {
        let (state, _) = test_state().await;
        let token = token_for(&state, "alice", "alice-password").await;
        let (status, body) = call(app(state), Method::GET, "/health", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let (state, _) = test_state().await;
        let (status, body) = call(app(state.clone()), Method::GET, "/api/users/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authentication failed"));

        let (status, _) = call(app(state), Method::GET, "/other", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_route_with_token() {
        let (state, _) = test_state().await;
        let token = token_for(&state, "alice", "alice-password").await;
        let (status, body) = call(app(state), Method::GET, "/api/users/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn test_user_on_admin_route_is_forbidden() {
        let (state, _) = test_state().await;
        let token = token_for(&state, "alice", "alice-password").await;
        let (status, body) = call(app(state), Method::GET, "/api/admin/ping", Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("Access denied"));
    }

    #[tokio::test]
    async fn test_admin_on_admin_route() {
        let (state, _) = test_state().await;
        let token = token_for(&state, "root", "root-password").await;
        let (status, body) = call(app(state), Method::GET, "/api/admin/ping", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "root");
    }

    #[tokio::test]
    async fn test_expired_and_revoked_tokens_rejected_uniformly() {
        let (state, clock) = test_state().await;
        let revoked = token_for(&state, "alice", "alice-password").await;
        state.authority.revoke(&revoked).await.unwrap();
        let (status, revoked_body) = call(
            app(state.clone()),
            Method::GET,
            "/api/users/me",
            Some(&revoked),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let expiring = token_for(&state, "alice", "alice-password").await;
        clock.advance(3600);
        let (status, expired_body) =
            call(app(state), Method::GET, "/api/users/me", Some(&expiring)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(revoked_body, expired_body);
    }

    #[tokio::test]
    async fn test_identity_extractor_without_gate() {
        let (state, _) = test_state().await;
        let app = Router::new()
            .route("/api/users/me", get(me))
            .with_state(state);
        let (status, _) = call(app, Method::GET, "/api/users/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
