//! Background pruning of the in-memory revocation set.
//!
//! A revocation entry only matters until the token it names would have
//! expired anyway. Redis drops such entries through key TTLs; the in-memory
//! store needs this job to do the same.

use crate::auth::clock::Clock;
use crate::storage::memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Run the prune loop.
///
/// Every `interval`, removes revocation entries whose tokens have expired.
pub async fn run_prune_loop(store: Arc<MemoryStore>, clock: Arc<dyn Clock>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        prune_once(&store, clock.as_ref());
    }
}

/// One pruning pass. Returns the number of entries removed.
pub fn prune_once(store: &MemoryStore, clock: &dyn Clock) -> usize {
    let removed = store.prune_revocations(clock.now());
    if removed > 0 {
        tracing::info!(
            action = "revocations_pruned",
            removed = removed,
            remaining = store.revocation_count(),
            "Prune job completed"
        );
    }
    removed
}
