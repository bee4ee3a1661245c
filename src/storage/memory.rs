//! In-process account and revocation store.
//!
//! Accounts live behind a single read-write lock (the username index and the
//! id map must change together). The revocation set is read on every
//! authenticated request, so it is split into shards, each with its own lock.

use super::{AccountStore, RevocationStore, StoreError};
use crate::models::{RevocationEntry, Role, StoredUser};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const SHARD_COUNT: usize = 16;

/// A string-keyed map split across independently locked shards.
pub struct StripedMap<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
}

impl<V: Clone> StripedMap<V> {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Returns false if the key was already present; the existing value is kept.
    pub fn insert_if_absent(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).write();
        if shard.contains_key(key) {
            return false;
        }
        shard.insert(key.to_string(), value);
        true
    }

    pub fn insert(&self, key: &str, value: V) {
        self.shard(key).write().insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Keep only entries matching `keep`. Returns how many were removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, v| keep(v));
            removed += before - shard.len();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct SubjectRevocation {
    revoked_at: u64,
    retain_until: u64,
}

#[derive(Default)]
struct Accounts {
    by_id: HashMap<String, StoredUser>,
    id_by_username: HashMap<String, String>,
}

pub struct MemoryStore {
    accounts: RwLock<Accounts>,
    revoked: StripedMap<RevocationEntry>,
    revoked_subjects: StripedMap<SubjectRevocation>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(Accounts::default()),
            revoked: StripedMap::new(SHARD_COUNT),
            revoked_subjects: StripedMap::new(SHARD_COUNT),
        }
    }

    /// Drop revocation entries whose tokens have expired on their own.
    ///
    /// Returns the number of entries removed.
    pub fn prune_revocations(&self, now: u64) -> usize {
        let tokens = self.revoked.retain(|entry| entry.expires_at > now);
        let subjects = self
            .revoked_subjects
            .retain(|entry| entry.retain_until > now);
        tokens + subjects
    }

    pub fn revocation_count(&self) -> usize {
        self.revoked.len() + self.revoked_subjects.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_identifier(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        let accounts = self.accounts.read();
        Ok(accounts
            .id_by_username
            .get(username)
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredUser>, StoreError> {
        Ok(self.accounts.read().by_id.get(id).cloned())
    }

    async fn insert_user(&self, user: &StoredUser) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write();
        if accounts.id_by_username.contains_key(&user.username) {
            return Ok(false);
        }
        accounts
            .id_by_username
            .insert(user.username.clone(), user.id.clone());
        accounts.by_id.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn update_role(
        &self,
        id: &str,
        role: Role,
        updated_at: u64,
    ) -> Result<Option<StoredUser>, StoreError> {
        let mut accounts = self.accounts.write();
        Ok(accounts.by_id.get_mut(id).map(|user| {
            user.role = role;
            user.updated_at = Some(updated_at);
            user.clone()
        }))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write();
        match accounts.by_id.remove(id) {
            Some(user) => {
                accounts.id_by_username.remove(&user.username);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<StoredUser>, StoreError> {
        let mut users: Vec<StoredUser> = self
            .accounts
            .read()
            .by_id
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(users)
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn store_revocation(&self, entry: &RevocationEntry) -> Result<bool, StoreError> {
        Ok(self.revoked.insert_if_absent(&entry.token_id, entry.clone()))
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        Ok(self.revoked.contains(token_id))
    }

    async fn revoke_subject(
        &self,
        user_id: &str,
        revoked_at: u64,
        retain_secs: u64,
    ) -> Result<(), StoreError> {
        self.revoked_subjects.insert(
            user_id,
            SubjectRevocation {
                revoked_at,
                retain_until: revoked_at.saturating_add(retain_secs),
            },
        );
        Ok(())
    }

    async fn subject_revoked_at(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.revoked_subjects.get(user_id).map(|s| s.revoked_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(id: &str, username: &str, role: Role, created_at: u64) -> StoredUser {
        StoredUser {
            id: id.to_string(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            role,
            created_at,
            updated_at: None,
        }
    }

    fn entry(token_id: &str, expires_at: u64) -> RevocationEntry {
        RevocationEntry {
            token_id: token_id.to_string(),
            subject: "alice".to_string(),
            revoked_at: 100,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_username() {
        let store = MemoryStore::new();
        assert!(store
            .insert_user(&user("id1", "alice", Role::User, 1))
            .await
            .unwrap());
        assert!(!store
            .insert_user(&user("id2", "alice", Role::User, 2))
            .await
            .unwrap());

        let found = store.find_by_identifier("alice").await.unwrap().unwrap();
        assert_eq!(found.id, "id1");
        assert!(store.find_by_identifier("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_frees_username() {
        let store = MemoryStore::new();
        store
            .insert_user(&user("id1", "alice", Role::User, 1))
            .await
            .unwrap();
        assert!(store.delete_user("id1").await.unwrap());
        assert!(!store.delete_user("id1").await.unwrap());
        assert!(store.find_by_identifier("alice").await.unwrap().is_none());
        assert!(store
            .insert_user(&user("id2", "alice", Role::User, 2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_role_and_list_by_role() {
        let store = MemoryStore::new();
        store
            .insert_user(&user("b", "bob", Role::User, 2))
            .await
            .unwrap();
        store
            .insert_user(&user("a", "alice", Role::User, 1))
            .await
            .unwrap();

        let updated = store
            .update_role("b", Role::Admin, 50)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.updated_at, Some(50));
        assert!(store
            .update_role("missing", Role::Admin, 50)
            .await
            .unwrap()
            .is_none());

        let all = store.list_users(None).await.unwrap();
        assert_eq!(
            all.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let admins = store.list_users(Some(Role::Admin)).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].username, "bob");
    }

    #[tokio::test]
    async fn test_revocation_is_single_winner() {
        let store = MemoryStore::new();
        assert!(!store.is_revoked("jti-1").await.unwrap());
        assert!(store.store_revocation(&entry("jti-1", 200)).await.unwrap());
        assert!(!store.store_revocation(&entry("jti-1", 200)).await.unwrap());
        assert!(store.is_revoked("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_drops_only_expired_entries() {
        let store = MemoryStore::new();
        store.store_revocation(&entry("old", 150)).await.unwrap();
        store.store_revocation(&entry("live", 500)).await.unwrap();
        store.revoke_subject("u1", 100, 100).await.unwrap();
        store.revoke_subject("u2", 100, 1_000).await.unwrap();

        assert_eq!(store.prune_revocations(200), 2);
        assert!(!store.is_revoked("old").await.unwrap());
        assert!(store.is_revoked("live").await.unwrap());
        assert_eq!(store.subject_revoked_at("u1").await.unwrap(), None);
        assert_eq!(store.subject_revoked_at("u2").await.unwrap(), Some(100));
        assert_eq!(store.revocation_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_revocation_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store_revocation(&entry("shared", 500)).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_striped_map_spreads_keys() {
        let map: StripedMap<u32> = StripedMap::new(4);
        for i in 0..100 {
            map.insert(&format!("key-{}", i), i);
        }
        assert_eq!(map.len(), 100);
        assert!(map.shards.iter().filter(|s| !s.read().is_empty()).count() > 1);
        assert_eq!(map.get("key-7"), Some(7));
        assert!(!map.is_empty());
    }
}
