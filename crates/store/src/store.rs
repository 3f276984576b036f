//! Shard-aware user repository.
//!
//! # Routing
//!
//! | Operation       | Shards visited                     | Cache        | Errors      |
//! |-----------------|------------------------------------|--------------|-------------|
//! | `create`        | `route(login ++ password)`         | untouched    | returned    |
//! | `authenticate`  | `route(login ++ password)`         | untouched    | logged      |
//! | `read_by_id`    | all, in order, until first hit     | read + fill  | logged      |
//! | `read_all`      | all                                | untouched    | returned    |
//! | `search`        | all                                | untouched    | returned    |
//!
//! Shards are keyed by credentials, so an id or a name prefix says nothing
//! about placement and those lookups must visit every shard.

use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, error, info, instrument, warn};

use shardstore_core::{ShardRouter, User, UserId};

use crate::cache::CacheAside;
use crate::credentials::{CredentialPolicy, PlaintextCredentials};
use crate::db::{Shard, ShardError};
use crate::error::{Result, StoreError};
use crate::queue::QueuePublisher;

/// Repository for users spread across shards.
pub struct UserStore {
    router: ShardRouter<Shard>,
    cache: CacheAside,
    credentials: Box<dyn CredentialPolicy>,
    publisher: Option<Arc<QueuePublisher>>,
}

impl UserStore {
    /// Create a store over the given shards and cache.
    ///
    /// Passwords are stored in plaintext and nothing is published until
    /// configured otherwise.
    #[must_use]
    pub fn new(router: ShardRouter<Shard>, cache: CacheAside) -> Self {
        Self {
            router,
            cache,
            credentials: Box::new(PlaintextCredentials),
            publisher: None,
        }
    }

    /// Use a different credential policy.
    #[must_use]
    pub fn with_credential_policy(mut self, policy: impl CredentialPolicy + 'static) -> Self {
        self.credentials = Box::new(policy);
        self
    }

    /// Publish every created user through `publisher`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<QueuePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The shard router.
    #[must_use]
    pub const fn router(&self) -> &ShardRouter<Shard> {
        &self.router
    }

    /// Create the user table on every shard.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` naming the shard if any shard fails.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        try_join_all(self.router.all_shards().iter().map(|shard| async move {
            shard
                .backend()
                .ensure_schema()
                .await
                .map_err(|e| log_failure(shard, e, "ensure_schema"))
        }))
        .await?;

        info!(shards = self.router.len(), "Schema ready on all shards");
        Ok(())
    }

    /// Persist a new user on the shard its credentials route to.
    ///
    /// When a publisher is attached, the persisted user is published after
    /// the insert. Publishing does not affect the result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyPersisted` if `user` already has an id,
    /// `StoreError::Credential` if the password cannot be stored, and
    /// `StoreError::Connection`/`StoreError::Statement` if the insert fails.
    #[instrument(skip_all, fields(shard))]
    pub async fn create(&self, user: &User) -> Result<UserId> {
        if let Some(id) = user.id {
            return Err(StoreError::AlreadyPersisted(id));
        }

        let shard = self.router.route_credentials(&user.login, &user.password);
        tracing::Span::current().record("shard", shard.name());

        let stored = User {
            password: self.credentials.protect(&user.password)?,
            ..user.clone()
        };

        let id = shard
            .backend()
            .insert(&stored)
            .await
            .map_err(|e| log_failure(shard, e, "insert"))?;
        info!(%id, "Created user");

        if let Some(publisher) = &self.publisher
            && let Err(e) = publisher.publish(&stored.with_id(id)).await
        {
            warn!(%id, error = %e, "Created user was not published");
        }

        Ok(id)
    }

    /// Look up a user by id.
    ///
    /// With `use_cache`, a cached snapshot is returned without touching any
    /// shard, and a user found on a shard is cached. Otherwise every shard is
    /// asked in order until one has the row. Backend failures are logged and
    /// read as "not found"; a connection failure on the first shard ends the
    /// lookup.
    #[instrument(skip(self))]
    pub async fn read_by_id(&self, id: UserId, use_cache: bool) -> Option<User> {
        if use_cache && let Some(user) = self.cache.get(id).await {
            debug!("Cache hit");
            return Some(user);
        }

        for (index, shard) in self.router.all_shards().iter().enumerate() {
            match shard.backend().find_by_id(id).await {
                Ok(Some(user)) => {
                    debug!(shard = shard.name(), "Found user");
                    if use_cache {
                        self.cache.put(&user).await;
                    }
                    return Some(user);
                }
                Ok(None) => {}
                Err(ShardError::Connection(message)) if index == 0 => {
                    error!(shard = shard.name(), %message, "First shard unreachable, abandoning lookup");
                    return None;
                }
                Err(e) => {
                    warn!(shard = shard.name(), error = %e, "Skipping shard");
                }
            }
        }

        None
    }

    /// Every user on every shard, in shard order then insertion order.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` naming the shard if any shard fails.
    #[instrument(skip(self))]
    pub async fn read_all(&self) -> Result<Vec<User>> {
        self.fan_out("scan", |shard| shard.backend().scan()).await
    }

    /// Users whose first and last names start with the given prefixes.
    ///
    /// Matching is case-sensitive; both prefixes must match.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` naming the shard if any shard fails.
    #[instrument(skip(self))]
    pub async fn search(&self, first_name_prefix: &str, last_name_prefix: &str) -> Result<Vec<User>> {
        self.fan_out("search", |shard| {
            shard.backend().search(first_name_prefix, last_name_prefix)
        })
        .await
    }

    /// Check a credential pair, returning the matching user's id.
    ///
    /// Only the shard the pair routes to is queried. Mismatches and backend
    /// failures both yield `None`.
    #[instrument(skip_all, fields(login = %login))]
    pub async fn authenticate(&self, login: &str, password: &str) -> Option<UserId> {
        let shard = self.router.route_credentials(login, password);

        match shard.backend().find_by_login(login).await {
            Ok(candidates) => candidates
                .into_iter()
                .find(|user| self.credentials.verify(password, &user.password))
                .and_then(|user| user.id),
            Err(e) => {
                error!(shard = shard.name(), error = %e, "Authentication lookup failed");
                None
            }
        }
    }

    /// Run `query` on every shard concurrently and concatenate in shard order.
    async fn fan_out<'s, F, Fut>(&'s self, operation: &'static str, query: F) -> Result<Vec<User>>
    where
        F: Fn(&'s Shard) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<User>, ShardError>>,
    {
        let per_shard = try_join_all(self.router.all_shards().iter().map(|shard| {
            let rows = query(shard);
            async move { rows.await.map_err(|e| log_failure(shard, e, operation)) }
        }))
        .await?;

        let users: Vec<User> = per_shard.into_iter().flatten().collect();
        debug!(operation, count = users.len(), "Fan-out complete");
        Ok(users)
    }
}

fn log_failure(shard: &Shard, err: ShardError, operation: &'static str) -> StoreError {
    let err = StoreError::on_shard(shard, err);
    error!(operation, error = %err, "Shard operation failed");
    err
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MokaSnapshotCache;
    use crate::credentials::Argon2Credentials;
    use crate::db::UserShard;
    use crate::db::memory::MemoryShard;
    use crate::queue::QueuePublisher;
    use crate::queue::memory::MemoryProducer;

    fn fixture(count: usize) -> (UserStore, Vec<Arc<MemoryShard>>) {
        let backends: Vec<Arc<MemoryShard>> =
            (0..count).map(|_| Arc::new(MemoryShard::new())).collect();
        let shards = backends
            .iter()
            .enumerate()
            .map(|(i, b)| Shard::new(crate::db::shard_name(i), Arc::clone(b) as Arc<dyn UserShard>))
            .collect();
        let store = UserStore::new(
            ShardRouter::new(shards).unwrap(),
            CacheAside::new(MokaSnapshotCache::new(100, None)),
        );
        (store, backends)
    }

    fn total_accesses(backends: &[Arc<MemoryShard>]) -> usize {
        backends.iter().map(|b| b.accesses()).sum()
    }

    #[tokio::test]
    async fn test_create_writes_only_to_routed_shard() {
        let (store, backends) = fixture(4);
        let user = User::new("Ada", "Lovelace", "ada", "p1");

        store.create(&user).await.unwrap();

        let expected = store.router().shard_index(user.routing_key());
        for (index, backend) in backends.iter().enumerate() {
            let rows = backend.rows().len();
            assert_eq!(rows, usize::from(index == expected), "shard {index}");
        }
    }

    #[tokio::test]
    async fn test_create_rejects_persisted_user() {
        let (store, backends) = fixture(2);
        let user = User::new("Ada", "Lovelace", "ada", "p1").with_id(UserId::new(3));

        let err = store.create(&user).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyPersisted(id) if id == UserId::new(3)));
        assert_eq!(total_accesses(&backends), 0);
    }

    #[tokio::test]
    async fn test_create_propagates_shard_errors() {
        let (store, backends) = fixture(1);
        backends[0].set_failure(Some(ShardError::Statement("constraint".to_owned())));

        let err = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { ref shard, .. } if shard == "shard_0"));
    }

    #[tokio::test]
    async fn test_read_by_id_without_cache_always_fans_out() {
        let (store, backends) = fixture(3);
        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let before = total_accesses(&backends);
        assert!(store.read_by_id(id, false).await.is_some());
        assert!(store.read_by_id(id, false).await.is_some());
        assert!(total_accesses(&backends) > before + 1);
    }

    #[tokio::test]
    async fn test_read_by_id_second_cached_read_skips_backend() {
        let (store, backends) = fixture(3);
        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let first = store.read_by_id(id, true).await.unwrap();
        let after_first = total_accesses(&backends);

        let second = store.read_by_id(id, true).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(total_accesses(&backends), after_first);
    }

    #[tokio::test]
    async fn test_read_by_id_stops_at_first_hit() {
        let (store, backends) = fixture(3);
        // Same id on every shard; shard order decides.
        for (i, backend) in backends.iter().enumerate() {
            backend
                .insert(&User::new(format!("User{i}"), "X", format!("u{i}"), "pw"))
                .await
                .unwrap();
        }

        let user = store.read_by_id(UserId::new(1), false).await.unwrap();
        assert_eq!(user.first_name, "User0");
        assert_eq!(backends[1].accesses(), 1);
        assert_eq!(backends[2].accesses(), 1);
    }

    #[tokio::test]
    async fn test_read_by_id_first_shard_connection_failure_is_not_found() {
        let (store, backends) = fixture(2);
        backends[1]
            .insert(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();
        backends[0].set_failure(Some(ShardError::Connection("refused".to_owned())));

        assert!(store.read_by_id(UserId::new(1), false).await.is_none());
        // Second shard was never asked for the row.
        assert_eq!(backends[1].accesses(), 1);
    }

    #[tokio::test]
    async fn test_read_by_id_skips_failing_later_shards() {
        let (store, backends) = fixture(3);
        backends[0].set_failure(Some(ShardError::Statement("bad".to_owned())));
        backends[1].set_failure(Some(ShardError::Connection("refused".to_owned())));
        backends[2]
            .insert(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let user = store.read_by_id(UserId::new(1), true).await.unwrap();
        assert_eq!(user.login, "ada");
    }

    #[tokio::test]
    async fn test_read_all_propagates_shard_errors() {
        let (store, backends) = fixture(3);
        backends[2].set_failure(Some(ShardError::Connection("refused".to_owned())));

        let err = store.read_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection { ref shard, .. } if shard == "shard_2"));
        assert!(store.search("A", "B").await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_authenticate_queries_single_shard() {
        let (store, backends) = fixture(4);
        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let before: Vec<usize> = backends.iter().map(|b| b.accesses()).collect();
        assert_eq!(store.authenticate("ada", "p1").await, Some(id));
        let touched = backends
            .iter()
            .zip(&before)
            .filter(|(b, n)| b.accesses() != **n)
            .count();
        assert_eq!(touched, 1);
    }

    #[tokio::test]
    async fn test_authenticate_backend_failure_is_none() {
        let (store, backends) = fixture(1);
        store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();
        backends[0].set_failure(Some(ShardError::Connection("refused".to_owned())));

        assert_eq!(store.authenticate("ada", "p1").await, None);
    }

    #[tokio::test]
    async fn test_argon2_policy_stores_hash_and_authenticates() {
        let (store, backends) = fixture(2);
        let store = store.with_credential_policy(Argon2Credentials);

        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let stored = store.read_by_id(id, false).await.unwrap();
        assert_ne!(stored.password, "p1");
        assert!(backends.iter().any(|b| !b.rows().is_empty()));

        assert_eq!(store.authenticate("ada", "p1").await, Some(id));
        assert_eq!(store.authenticate("ada", "p2").await, None);
    }

    #[tokio::test]
    async fn test_create_publishes_persisted_user() {
        let producer = MemoryProducer::new();
        let publisher = Arc::new(QueuePublisher::new(producer.clone(), "users"));
        let (store, _) = fixture(2);
        let store = store.with_publisher(publisher);

        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();

        let messages = producer.messages();
        assert_eq!(messages.len(), 1);
        let published = shardstore_core::codec::from_json(&messages[0].payload).unwrap();
        assert_eq!(published.id, Some(id));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_create() {
        let producer = MemoryProducer::new();
        producer.reject_next(usize::MAX);
        let publisher = Arc::new(
            QueuePublisher::new(producer.clone(), "users")
                .with_retry_policy(crate::queue::RetryPolicy::bounded(2)),
        );
        let (store, _) = fixture(1);
        let store = store.with_publisher(publisher);

        assert!(store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .is_ok());
        assert!(producer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_schema_touches_every_shard() {
        let (store, backends) = fixture(3);
        store.ensure_schema().await.unwrap();
        assert!(backends.iter().all(|b| b.accesses() == 1));

        backends[1].set_failure(Some(ShardError::Statement("denied".to_owned())));
        assert!(store.ensure_schema().await.is_err());
    }

    #[tokio::test]
    async fn test_read_by_id_undecodable_cache_entry_falls_back_to_shards() {
        use crate::cache::SnapshotCache;

        let backend = Arc::new(MemoryShard::new());
        let snapshots = MokaSnapshotCache::new(100, None);
        let store = UserStore::new(
            ShardRouter::new(vec![Shard::new(
                "shard_0",
                Arc::clone(&backend) as Arc<dyn UserShard>,
            )])
            .unwrap(),
            CacheAside::new(snapshots.clone()),
        );
        let id = store
            .create(&User::new("Ada", "Lovelace", "ada", "p1"))
            .await
            .unwrap();
        snapshots.put(id, "{garbage".to_owned()).await;

        let user = store.read_by_id(id, true).await.unwrap();
        assert_eq!(user.login, "ada");

        // The fresh row replaced the bad snapshot.
        let before = backend.accesses();
        store.read_by_id(id, true).await.unwrap();
        assert_eq!(backend.accesses(), before);
    }
}
