//! Cache-aside layer for user snapshots.
//!
//! Snapshots are JSON records keyed by user id. The cache is never
//! authoritative and is never invalidated by writes; a snapshot may be stale
//! for as long as the backend keeps it. Anything that fails to decode, or
//! decodes to a different user than the key names, is a miss, so a bad entry
//! falls through to the store instead of surfacing.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use shardstore_core::{User, UserId, codec};

/// Key-value storage for serialized snapshots.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Fetch the snapshot stored for `id`.
    async fn get(&self, id: UserId) -> Option<String>;

    /// Store a snapshot for `id`, replacing any previous one.
    async fn put(&self, id: UserId, snapshot: String);
}

/// In-process snapshot cache built on `moka`.
#[derive(Clone)]
pub struct MokaSnapshotCache {
    inner: Cache<UserId, String>,
}

impl MokaSnapshotCache {
    /// Create a cache holding at most `max_capacity` snapshots.
    ///
    /// Entries expire after `time_to_live` when one is given.
    #[must_use]
    pub fn new(max_capacity: u64, time_to_live: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(max_capacity);
        if let Some(ttl) = time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }
}

#[async_trait]
impl SnapshotCache for MokaSnapshotCache {
    async fn get(&self, id: UserId) -> Option<String> {
        self.inner.get(&id).await
    }

    async fn put(&self, id: UserId, snapshot: String) {
        self.inner.insert(id, snapshot).await;
    }
}

/// Typed cache-aside access on top of a [`SnapshotCache`].
pub struct CacheAside {
    backend: Box<dyn SnapshotCache>,
}

impl CacheAside {
    /// Wrap a snapshot backend.
    #[must_use]
    pub fn new(backend: impl SnapshotCache + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Look up a user. Decode failures and id mismatches count as a miss.
    pub async fn get(&self, id: UserId) -> Option<User> {
        let snapshot = self.backend.get(id).await?;
        match codec::from_json(&snapshot) {
            Ok(user) if user.id == Some(id) => Some(user),
            Ok(user) => {
                debug!(%id, cached_id = ?user.id, "Discarding cache entry for another user");
                None
            }
            Err(e) => {
                debug!(%id, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a snapshot of a persisted user. Users without an id are skipped.
    pub async fn put(&self, user: &User) {
        let Some(id) = user.id else {
            debug!("Not caching unpersisted user");
            return;
        };
        self.backend.put(id, codec::to_json(user)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache() -> (MokaSnapshotCache, CacheAside) {
        let backend = MokaSnapshotCache::new(100, None);
        (backend.clone(), CacheAside::new(backend))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_, cache) = cache();
        let user = User::new("Ada", "Lovelace", "ada", "p1").with_id(UserId::new(7));
        cache.put(&user).await;
        assert_eq!(cache.get(UserId::new(7)).await, Some(user));
    }

    #[tokio::test]
    async fn test_miss() {
        let (_, cache) = cache();
        assert!(cache.get(UserId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_snapshot_is_a_miss() {
        let (backend, cache) = cache();
        backend.put(UserId::new(3), "not json".to_owned()).await;
        backend
            .put(UserId::new(4), r#"{"id":4,"first_name":"A"}"#.to_owned())
            .await;

        assert!(cache.get(UserId::new(3)).await.is_none());
        assert!(cache.get(UserId::new(4)).await.is_none());
    }

    #[tokio::test]
    async fn test_unpersisted_user_is_not_cached() {
        let (backend, cache) = cache();
        cache.put(&User::new("Ada", "Lovelace", "ada", "p1")).await;
        backend.inner.run_pending_tasks().await;
        assert_eq!(backend.inner.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_for_another_id_is_a_miss() {
        let (backend, cache) = cache();
        let other = User::new("Ada", "Lovelace", "ada", "p1").with_id(UserId::new(6));
        backend.put(UserId::new(5), codec::to_json(&other)).await;
        let unkeyed = User::new("Alan", "Turing", "alan", "p2");
        backend.put(UserId::new(8), codec::to_json(&unkeyed)).await;

        assert!(cache.get(UserId::new(5)).await.is_none());
        assert!(cache.get(UserId::new(8)).await.is_none());
    }
}
