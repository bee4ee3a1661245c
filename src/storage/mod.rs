//! Account and revocation storage.
//!
//! Two backends implement the same traits:
//! - [`memory::MemoryStore`] keeps everything in process, with a lock-striped
//!   revocation set.
//! - [`RedisStore`] keeps JSON values in Redis; revocations expire by TTL.
//!
//! Every call made on a request path goes through [`bounded`] so a stalled
//! backend turns into an error instead of a hung request.

pub mod memory;
pub mod revocation;
pub mod user;

use crate::models::{RevocationEntry, Role, StoredUser};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

/// Maximum number of keys returned by scan_keys to prevent unbounded memory allocation.
const SCAN_MAX_KEYS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Account lookups used by credential verification and the admin API.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_identifier(&self, username: &str) -> Result<Option<StoredUser>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, StoreError>;

    /// Insert a new account. Returns false if the username is already taken.
    async fn insert_user(&self, user: &StoredUser) -> Result<bool, StoreError>;

    /// Change an account's role. Returns the updated account, or None if it does not exist.
    async fn update_role(
        &self,
        id: &str,
        role: Role,
        updated_at: u64,
    ) -> Result<Option<StoredUser>, StoreError>;

    /// Returns true if the account existed.
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;

    /// All accounts, optionally restricted to one role, ordered by creation time.
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<StoredUser>, StoreError>;
}

/// The set of tokens invalidated before their natural expiry.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revoked token id. Returns false if it was already revoked.
    async fn store_revocation(&self, entry: &RevocationEntry) -> Result<bool, StoreError>;

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Revoke every token of `user_id` issued at or before `revoked_at`.
    ///
    /// The marker only needs to outlive the longest token lifetime, `retain_secs`.
    async fn revoke_subject(
        &self,
        user_id: &str,
        revoked_at: u64,
        retain_secs: u64,
    ) -> Result<(), StoreError>;

    async fn subject_revoked_at(&self, user_id: &str) -> Result<Option<u64>, StoreError>;
}

/// Run a store call with a deadline.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Redis-backed account and revocation store.
#[derive(Clone)]
pub struct RedisStore {
    con: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(Self { con })
    }
}

#[async_trait]
impl AccountStore for RedisStore {
    async fn find_by_identifier(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        let mut con = self.con.clone();
        user::get_user_by_username(&mut con, username).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, StoreError> {
        let mut con = self.con.clone();
        user::get_user(&mut con, id).await
    }

    async fn insert_user(&self, new_user: &StoredUser) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        user::store_user_if_absent(&mut con, new_user).await
    }

    async fn update_role(
        &self,
        id: &str,
        role: Role,
        updated_at: u64,
    ) -> Result<Option<StoredUser>, StoreError> {
        let mut con = self.con.clone();
        let Some(mut existing) = user::get_user(&mut con, id).await? else {
            return Ok(None);
        };
        existing.role = role;
        existing.updated_at = Some(updated_at);
        if !user::update_existing_user(&mut con, &existing).await? {
            return Ok(None);
        }
        Ok(Some(existing))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        user::delete_user(&mut con, id).await
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<StoredUser>, StoreError> {
        let mut con = self.con.clone();
        let mut users = user::list_users(&mut con).await?;
        users.retain(|u| role.map_or(true, |r| u.role == r));
        users.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(users)
    }
}

#[async_trait]
impl RevocationStore for RedisStore {
    async fn store_revocation(&self, entry: &RevocationEntry) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        revocation::store_revocation(&mut con, entry).await
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        revocation::is_revoked(&mut con, token_id).await
    }

    async fn revoke_subject(
        &self,
        user_id: &str,
        revoked_at: u64,
        retain_secs: u64,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        revocation::store_subject_revocation(&mut con, user_id, revoked_at, retain_secs).await
    }

    async fn subject_revoked_at(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        let mut con = self.con.clone();
        revocation::get_subject_revocation(&mut con, user_id).await
    }
}

/// Scan for Redis keys matching a pattern using SCAN (non-blocking).
///
/// Capped at SCAN_MAX_KEYS results to prevent unbounded memory growth.
pub async fn scan_keys<C>(con: &mut C, pattern: &str) -> Result<Vec<String>, redis::RedisError>
where
    C: AsyncCommands,
{
    let mut all_keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(con)
            .await?;
        all_keys.extend(keys);
        if all_keys.len() >= SCAN_MAX_KEYS {
            all_keys.truncate(SCAN_MAX_KEYS);
            break;
        }
        cursor = new_cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(all_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_millis(100), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), StoreError> =
            bounded(Duration::from_millis(10), std::future::pending()).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
