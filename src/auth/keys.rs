//! Signing-key lifecycle.
//!
//! The key ring is loaded once at startup and only changes through
//! [`KeyRing::rotate`]. Rotation retires the active key instead of dropping
//! it: tokens it signed keep verifying until the grace period runs out.

use base64::{engine::general_purpose, Engine as _};
use parking_lot::RwLock;
use std::sync::Arc;
use zeroize::Zeroizing;

/// HS256 needs at least 256 bits of key material.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    SecretTooShort(usize),

    #[error("key id cannot be empty")]
    EmptyKeyId,
}

/// One HMAC secret and the id it is published under in token headers.
pub struct SigningKey {
    kid: String,
    secret: Zeroizing<Vec<u8>>,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, secret: Vec<u8>) -> Result<Self, KeyError> {
        let kid = kid.into();
        if kid.is_empty() {
            return Err(KeyError::EmptyKeyId);
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeyError::SecretTooShort(secret.len()));
        }
        Ok(Self {
            kid,
            secret: Zeroizing::new(secret),
        })
    }

    /// Fresh random key with a random id.
    pub fn generate() -> Self {
        Self {
            kid: nanoid::nanoid!(10),
            secret: Zeroizing::new(generate_secret().to_vec()),
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// 32 random bytes.
pub fn generate_secret() -> [u8; MIN_SECRET_LEN] {
    let mut secret = [0u8; MIN_SECRET_LEN];
    rand::fill(&mut secret);
    secret
}

/// Base64 form of a fresh secret, as accepted by `JWT_SECRET`.
pub fn generate_secret_base64() -> String {
    let mut secret = generate_secret();
    let encoded = general_purpose::STANDARD.encode(secret);
    secret.fill(0);
    encoded
}

struct RetiredKey {
    key: Arc<SigningKey>,
    retired_at: u64,
}

struct KeyRingInner {
    active: Arc<SigningKey>,
    retired: Vec<RetiredKey>,
}

/// The process-wide set of signing keys.
pub struct KeyRing {
    inner: RwLock<KeyRingInner>,
    grace_secs: u64,
}

impl KeyRing {
    pub fn new(initial: SigningKey, grace_secs: u64) -> Self {
        Self {
            inner: RwLock::new(KeyRingInner {
                active: Arc::new(initial),
                retired: Vec::new(),
            }),
            grace_secs,
        }
    }

    /// The key new tokens are signed with.
    pub fn active(&self) -> Arc<SigningKey> {
        self.inner.read().active.clone()
    }

    /// The key that may verify a token carrying `kid` at time `now`.
    ///
    /// `None` for unknown ids and for retired keys past their grace period.
    pub fn verification_key(&self, kid: Option<&str>, now: u64) -> Option<Arc<SigningKey>> {
        let inner = self.inner.read();
        let Some(kid) = kid else {
            return Some(inner.active.clone());
        };
        if inner.active.kid == kid {
            return Some(inner.active.clone());
        }
        inner
            .retired
            .iter()
            .find(|r| r.key.kid == kid && r.retired_at.saturating_add(self.grace_secs) > now)
            .map(|r| r.key.clone())
    }

    /// Replace the active key with a freshly generated one. Returns the new key id.
    pub fn rotate(&self, now: u64) -> String {
        self.rotate_to(SigningKey::generate(), now)
    }

    /// Replace the active key with `next`. Returns the new key id.
    pub fn rotate_to(&self, next: SigningKey, now: u64) -> String {
        let kid = next.kid.clone();
        let mut inner = self.inner.write();
        let previous = std::mem::replace(&mut inner.active, Arc::new(next));
        let grace = self.grace_secs;
        inner
            .retired
            .retain(|r| r.retired_at.saturating_add(grace) > now);
        inner.retired.push(RetiredKey {
            key: previous,
            retired_at: now,
        });
        kid
    }

    pub fn grace_secs(&self) -> u64 {
        self.grace_secs
    }

    pub fn retired_count(&self) -> usize {
        self.inner.read().retired.len()
    }
}
