//! Credential verification with Argon2id.

use crate::error::AppError;
use crate::models::StoredUser;
use crate::storage::{bounded, AccountStore, StoreError};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP recommended params: m=19456 (19MB), t=2, p=1
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no account for identifier")]
    NotFound,

    #[error("secret does not match")]
    Mismatch,

    #[error("account store error: {0}")]
    Store(#[from] StoreError),

    #[error("hashing error: {0}")]
    Hash(String),
}

/// Salted, deliberately slow one-way hashing of account secrets.
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
    /// Hash verified when an identifier is unknown, so both paths cost the same.
    dummy_hash: Arc<String>,
}

impl SecretHasher {
    pub fn new(cost: HashCost) -> Result<Self, VerifyError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| VerifyError::Hash(format!("Argon2 params: {}", e)))?;
        let mut hasher = Self {
            params,
            dummy_hash: Arc::new(String::new()),
        };
        hasher.dummy_hash = Arc::new(hasher.hash(&generate_dummy_secret())?);
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret into a PHC string. CPU-bound; call from a blocking context.
    pub fn hash(&self, secret: &str) -> Result<String, VerifyError> {
        let mut salt_bytes = [0u8; 16];
        rand::fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| VerifyError::Hash(format!("Argon2 salt: {}", e)))?;
        let phc = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| VerifyError::Hash(format!("Argon2 hash: {}", e)))?
            .to_string();
        Ok(phc)
    }

    /// Check a secret against a PHC string. Comparison is constant-time.
    pub fn matches(&self, secret: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon2()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Hash on the blocking pool.
    pub async fn hash_blocking(&self, secret: Zeroizing<String>) -> Result<String, VerifyError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| VerifyError::Hash(format!("hash task failed: {}", e)))?
    }

    /// Verify on the blocking pool. `None` burns the same work against the dummy hash.
    async fn matches_blocking(
        &self,
        secret: Zeroizing<String>,
        phc: Option<String>,
    ) -> Result<bool, VerifyError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match phc {
            Some(phc) => hasher.matches(&secret, &phc),
            None => {
                let _ = hasher.matches(&secret, &hasher.dummy_hash);
                false
            }
        })
        .await
        .map_err(|e| VerifyError::Hash(format!("verify task failed: {}", e)))
    }
}

fn generate_dummy_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Checks presented credentials against the account store.
pub struct CredentialVerifier {
    accounts: Arc<dyn AccountStore>,
    hasher: SecretHasher,
    store_timeout: Duration,
}

impl CredentialVerifier {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        hasher: SecretHasher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            hasher,
            store_timeout,
        }
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Return the account owning `identifier` if `secret` matches its stored hash.
    pub async fn verify(
        &self,
        identifier: &str,
        secret: Zeroizing<String>,
    ) -> Result<StoredUser, VerifyError> {
        let account = bounded(
            self.store_timeout,
            self.accounts.find_by_identifier(identifier),
        )
        .await?;

        let phc = account.as_ref().map(|a| a.password_hash.clone());
        let matched = self.hasher.matches_blocking(secret, phc).await?;

        match account {
            None => Err(VerifyError::NotFound),
            Some(_) if !matched => Err(VerifyError::Mismatch),
            Some(account) => Ok(account),
        }
    }
}

/// Username rules: 3-64 characters.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return Err(AppError::BadRequest(
            "Username length should be between 3 and 64 characters".to_string(),
        ));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::BadRequest(
            "Username may not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Password rules: 8-256 characters.
pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::BadRequest("Password is required".to_string()));
    }
    let len = password.chars().count();
    if !(8..=256).contains(&len) {
        return Err(AppError::BadRequest(
            "Password length should be between 8 and 256 characters".to_string(),
        ));
    }
    Ok(())
}
