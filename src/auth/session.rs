//! Token issuance, refresh and revocation.

use super::clock::Clock;
use super::token::{Claims, TokenCodec};
use super::verify::{CredentialVerifier, VerifyError};
use crate::error::{AppError, AuthError};
use crate::models::{RevocationEntry, Role, StoredUser};
use crate::storage::{bounded, AccountStore, RevocationStore};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> u64 {
        self.claims.exp
    }
}

/// Issues tokens for verified credentials and manages their invalidation.
pub struct SessionAuthority {
    codec: Arc<TokenCodec>,
    verifier: CredentialVerifier,
    accounts: Arc<dyn AccountStore>,
    revocations: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    token_ttl_secs: u64,
    store_timeout: Duration,
}

impl SessionAuthority {
    pub fn new(
        codec: Arc<TokenCodec>,
        verifier: CredentialVerifier,
        accounts: Arc<dyn AccountStore>,
        revocations: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
        token_ttl_secs: u64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            verifier,
            accounts,
            revocations,
            clock,
            token_ttl_secs,
            store_timeout,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }

    fn issue(&self, user: &StoredUser) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let claims = Claims::new(
            &user.username,
            &user.id,
            vec![user.role],
            now,
            now.saturating_add(self.token_ttl_secs),
        );
        let token = self.codec.encode(&claims)?;
        Ok(IssuedToken { token, claims })
    }

    /// Verify credentials and issue a token.
    ///
    /// Every failure collapses to `AuthFailed` (or `Unavailable` when the store
    /// could not answer); the specific reason is only logged.
    pub async fn login(
        &self,
        identifier: &str,
        secret: Zeroizing<String>,
    ) -> Result<IssuedToken, AuthError> {
        let user = match self.verifier.verify(identifier, secret).await {
            Ok(user) => user,
            Err(VerifyError::NotFound) | Err(VerifyError::Mismatch) => {
                tracing::warn!(action = "login_failed", username = %identifier, "Bad credentials");
                return Err(AuthError::AuthFailed);
            }
            Err(VerifyError::Store(e)) => {
                tracing::error!(action = "login_failed", error = %e, "Account store unavailable");
                return Err(AuthError::from(e));
            }
            Err(VerifyError::Hash(e)) => {
                tracing::error!(action = "login_failed", error = %e, "Credential check failed");
                return Err(AuthError::AuthFailed);
            }
        };

        let issued = self.issue(&user)?;
        tracing::info!(action = "login", user_id = %user.id, role = %user.role, jti = %issued.claims.jti, "User authenticated");
        Ok(issued)
    }

    /// Create a USER account and issue its first token.
    pub async fn register(
        &self,
        username: &str,
        secret: Zeroizing<String>,
    ) -> Result<IssuedToken, AppError> {
        let password_hash = self
            .verifier
            .hasher()
            .hash_blocking(secret)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let user = StoredUser {
            id: nanoid::nanoid!(12),
            username: username.to_string(),
            password_hash,
            role: Role::User,
            created_at: self.clock.now(),
            updated_at: None,
        };

        let inserted = bounded(self.store_timeout, self.accounts.insert_user(&user)).await?;
        if !inserted {
            tracing::warn!(action = "register_conflict", username = %username, "Username already taken");
            return Err(AppError::Conflict(format!(
                "User with username {} already exists",
                username
            )));
        }

        tracing::info!(action = "user_registered", user_id = %user.id, username = %user.username, "New user registered");
        Ok(self.issue(&user)?)
    }

    /// Create an account with a given role unless the username is taken.
    ///
    /// Returns false when the username already exists.
    pub async fn ensure_account(
        &self,
        username: &str,
        secret: Zeroizing<String>,
        role: Role,
    ) -> Result<bool, AppError> {
        let existing =
            bounded(self.store_timeout, self.accounts.find_by_identifier(username)).await?;
        if existing.is_some() {
            return Ok(false);
        }

        let password_hash = self
            .verifier
            .hasher()
            .hash_blocking(secret)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let user = StoredUser {
            id: nanoid::nanoid!(12),
            username: username.to_string(),
            password_hash,
            role,
            created_at: self.clock.now(),
            updated_at: None,
        };
        Ok(bounded(self.store_timeout, self.accounts.insert_user(&user)).await?)
    }

    /// Fail if the token or its subject has been revoked.
    ///
    /// Store failures and timeouts fail closed.
    pub async fn check_revocation(&self, claims: &Claims) -> Result<(), AuthError> {
        if bounded(self.store_timeout, self.revocations.is_revoked(&claims.jti)).await? {
            return Err(AuthError::Revoked);
        }
        let subject_cutoff =
            bounded(self.store_timeout, self.revocations.subject_revoked_at(&claims.uid)).await?;
        if subject_cutoff.is_some_and(|cutoff| claims.iat <= cutoff) {
            return Err(AuthError::Revoked);
        }
        Ok(())
    }

    /// Decode a token and check it against the revocation set.
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token)?;
        self.check_revocation(&claims).await?;
        Ok(claims)
    }

    /// Record a token id as revoked. Returns false if it already was.
    async fn revoke_claims(&self, claims: &Claims) -> Result<bool, AuthError> {
        let entry = RevocationEntry {
            token_id: claims.jti.clone(),
            subject: claims.sub.clone(),
            revoked_at: self.clock.now(),
            expires_at: claims.exp,
        };
        Ok(bounded(self.store_timeout, self.revocations.store_revocation(&entry)).await?)
    }

    /// Revoke a token before its natural expiry.
    ///
    /// Revoking an already revoked or already expired token is a no-op.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let claims = match self.codec.decode(token) {
            Ok(claims) => claims,
            Err(AuthError::Expired) => return Ok(()),
            Err(e) => return Err(e),
        };
        if self.revoke_claims(&claims).await? {
            tracing::info!(action = "token_revoked", jti = %claims.jti, user_id = %claims.uid, "Token revoked");
        }
        Ok(())
    }

    /// Revoke the token described by already validated claims (logout).
    pub async fn revoke_validated(&self, claims: &Claims) -> Result<(), AuthError> {
        if self.revoke_claims(claims).await? {
            tracing::info!(action = "logout", jti = %claims.jti, user_id = %claims.uid, "Token revoked by owner");
        }
        Ok(())
    }

    /// Exchange a still-valid token for a new one, revoking the old.
    ///
    /// The old token id is claimed with an insert-if-absent, so concurrent
    /// refreshes of one token produce at most one successor.
    pub async fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let old = self.validate(token).await?;

        let account = bounded(self.store_timeout, self.accounts.find_by_id(&old.uid))
            .await?
            .ok_or(AuthError::Revoked)?;

        if !self.revoke_claims(&old).await? {
            tracing::warn!(action = "refresh_replayed", jti = %old.jti, user_id = %old.uid, "Token already refreshed or revoked");
            return Err(AuthError::Revoked);
        }

        let issued = self.issue(&account)?;
        tracing::info!(action = "token_refreshed", old_jti = %old.jti, jti = %issued.claims.jti, user_id = %account.id, "Token refreshed");
        Ok(issued)
    }

    /// Revoke every outstanding token of a user.
    pub async fn revoke_subject(&self, user_id: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        bounded(
            self.store_timeout,
            self.revocations
                .revoke_subject(user_id, now, self.token_ttl_secs),
        )
        .await?;
        tracing::warn!(action = "subject_revoked", user_id = %user_id, "All tokens of user revoked");
        Ok(())
    }
}
