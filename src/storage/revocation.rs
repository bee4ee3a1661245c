//! Revocation Redis operations.
//!
//! Redis key patterns:
//! - `revoked:{jti}`: revocation entry (JSON), expires with the token
//! - `revoked_subject:{user_id}`: revocation timestamp for all of a user's tokens
//!
//! Entries carry a TTL so Redis drops them once the token they cover would
//! have expired anyway.

use super::StoreError;
use crate::models::RevocationEntry;
use redis::AsyncCommands;

fn revoked_key(token_id: &str) -> String {
    format!("revoked:{}", token_id)
}

fn subject_key(user_id: &str) -> String {
    format!("revoked_subject:{}", user_id)
}

/// Record a revoked token. Returns false if the token id was already revoked.
///
/// Uses `SET NX EX` so concurrent revocations of one token agree on a single winner.
pub async fn store_revocation<C>(con: &mut C, entry: &RevocationEntry) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let ttl_secs = entry.expires_at.saturating_sub(entry.revoked_at).max(1);
    let json = serde_json::to_string(entry)?;

    let stored: Option<String> = redis::cmd("SET")
        .arg(revoked_key(&entry.token_id))
        .arg(json)
        .arg("NX")
        .arg("EX")
        .arg(ttl_secs)
        .query_async(con)
        .await?;

    Ok(stored.is_some())
}

pub async fn is_revoked<C>(con: &mut C, token_id: &str) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let exists: bool = con.exists(revoked_key(token_id)).await?;
    Ok(exists)
}

/// Mark every token of a user issued at or before `revoked_at` as revoked.
pub async fn store_subject_revocation<C>(
    con: &mut C,
    user_id: &str,
    revoked_at: u64,
    retain_secs: u64,
) -> Result<(), StoreError>
where
    C: AsyncCommands,
{
    con.set_ex::<_, _, ()>(subject_key(user_id), revoked_at, retain_secs.max(1))
        .await?;
    Ok(())
}

pub async fn get_subject_revocation<C>(
    con: &mut C,
    user_id: &str,
) -> Result<Option<u64>, StoreError>
where
    C: AsyncCommands,
{
    let revoked_at: Option<u64> = con.get(subject_key(user_id)).await?;
    Ok(revoked_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_revocation_is_single_winner() {
        // Note: This test requires a running Redis instance
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let client = match redis::Client::open(redis_url) {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return;
            }
        };

        let mut con = match client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis connection failed");
                return;
            }
        };

        let entry = RevocationEntry {
            token_id: format!("unit-{}", nanoid::nanoid!(8)),
            subject: "alice".to_string(),
            revoked_at: 100,
            expires_at: 160,
        };

        assert!(!is_revoked(&mut con, &entry.token_id).await.unwrap());
        assert!(store_revocation(&mut con, &entry).await.unwrap());
        assert!(!store_revocation(&mut con, &entry).await.unwrap());
        assert!(is_revoked(&mut con, &entry.token_id).await.unwrap());

        let ttl: i64 = con.ttl(revoked_key(&entry.token_id)).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);

        let _: Result<(), _> = con.del(revoked_key(&entry.token_id)).await;
    }
}
