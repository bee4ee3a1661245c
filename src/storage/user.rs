//! Account Redis operations.
//!
//! Redis key patterns:
//! - `user:{id}`: account data (JSON)
//! - `username:{username}`: username lookup to user id (STRING)
//!
//! Account JSON carries the password hash, so fetched payloads are wrapped in
//! `Zeroizing` and cleared once deserialized.

use super::StoreError;
use crate::models::StoredUser;
use redis::AsyncCommands;
use zeroize::Zeroizing;

fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

/// Store a new account unless its username is taken.
///
/// The username claim (`SET NX`) and the account write run in one Lua
/// script, so a username never points at a missing account and two
/// concurrent registrations of the same name cannot both succeed.
pub async fn store_user_if_absent<C>(con: &mut C, user: &StoredUser) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let json = Zeroizing::new(serde_json::to_string(user)?);

    let script = redis::Script::new(
        r"
        if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
            return 0
        end
        redis.call('SET', KEYS[2], ARGV[2])
        return 1
        ",
    );

    let stored: i32 = script
        .key(username_key(&user.username))
        .key(user_key(&user.id))
        .arg(&user.id)
        .arg(json.as_str())
        .invoke_async(con)
        .await?;

    Ok(stored == 1)
}

/// Replace the JSON of an existing account.
///
/// Written with `SET XX`: returns false and writes nothing if the account
/// was deleted in the meantime.
pub async fn update_existing_user<C>(con: &mut C, user: &StoredUser) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let json = Zeroizing::new(serde_json::to_string(user)?);
    let updated: Option<String> = redis::cmd("SET")
        .arg(user_key(&user.id))
        .arg(json.as_str())
        .arg("XX")
        .query_async(con)
        .await?;
    Ok(updated.is_some())
}

/// Get an account by id.
pub async fn get_user<C>(con: &mut C, id: &str) -> Result<Option<StoredUser>, StoreError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(user_key(id)).await?;

    match json {
        Some(data) => {
            let zeroizing_data = Zeroizing::new(data);
            let user = serde_json::from_str(&zeroizing_data)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

/// Get an account by username.
///
/// Performs a two-step lookup: username -> user id -> account data.
pub async fn get_user_by_username<C>(
    con: &mut C,
    username: &str,
) -> Result<Option<StoredUser>, StoreError>
where
    C: AsyncCommands,
{
    let user_id: Option<String> = con.get(username_key(username)).await?;

    match user_id {
        Some(id) => get_user(con, &id).await,
        None => Ok(None),
    }
}

/// Delete an account and its username lookup.
///
/// Both keys go in one Lua script. The username key is only removed while it
/// still points at this account. Returns true if the account existed.
pub async fn delete_user<C>(con: &mut C, id: &str) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let script = redis::Script::new(
        r"
        local val = redis.call('GET', KEYS[1])
        if not val then
            return 0
        end
        redis.call('DEL', KEYS[1])
        local obj = cjson.decode(val)
        if type(obj.username) == 'string' then
            local name_key = ARGV[2] .. obj.username
            if redis.call('GET', name_key) == ARGV[1] then
                redis.call('DEL', name_key)
            end
        end
        return 1
        ",
    );

    let deleted: i32 = script
        .key(user_key(id))
        .arg(id)
        .arg("username:")
        .invoke_async(con)
        .await?;

    Ok(deleted == 1)
}

/// List all accounts.
///
/// Scans for keys matching `user:*`. Entries that fail to deserialize are skipped.
pub async fn list_users<C>(con: &mut C) -> Result<Vec<StoredUser>, StoreError>
where
    C: AsyncCommands,
{
    let mut users = Vec::new();
    let keys = super::scan_keys(con, "user:*").await?;

    for key in keys {
        let json: Option<String> = con.get(&key).await?;
        if let Some(data) = json {
            let zeroizing_data = Zeroizing::new(data);
            match serde_json::from_str::<StoredUser>(&zeroizing_data) {
                Ok(user) => users.push(user),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable account"),
            }
        }
    }

    Ok(users)
}
