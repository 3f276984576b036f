//! Store state shared across callers.

use std::sync::Arc;

use shardstore_core::{RouterError, ShardRouter};

use crate::cache::{CacheAside, MokaSnapshotCache};
use crate::config::{CredentialPolicyKind, StoreConfig};
use crate::credentials::{Argon2Credentials, PlaintextCredentials};
use crate::db::{self, PgUserShard, Shard};
use crate::queue::{ProduceError, QueuePublisher, RestProxyProducer};
use crate::store::UserStore;

/// Errors that can occur while wiring the store from configuration.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid connection string for {shard}: {source}")]
    InvalidUrl {
        shard: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("invalid shard topology: {0}")]
    Topology(#[from] RouterError),
    #[error("invalid queue producer: {0}")]
    Producer(#[from] ProduceError),
}

/// Store state shared across all callers.
///
/// This struct is cheaply cloneable via `Arc`. It owns the only
/// [`QueuePublisher`] for the process, so exactly one delivery-key counter
/// exists for as long as any clone is alive.
#[derive(Clone)]
pub struct StoreState {
    inner: Arc<StoreStateInner>,
}

struct StoreStateInner {
    config: StoreConfig,
    store: UserStore,
}

impl StoreState {
    /// Build the store from configuration.
    ///
    /// Shard pools connect lazily, so a shard that is down at startup does
    /// not prevent the store from being built; its operations fail (or read
    /// as not found) until it comes back.
    ///
    /// # Errors
    ///
    /// Returns an error if a shard URL cannot be parsed or the queue
    /// producer cannot be built.
    pub fn connect(config: StoreConfig) -> Result<Self, BootstrapError> {
        let mut shards = Vec::with_capacity(config.shard_urls.len());
        for (index, url) in config.shard_urls.iter().enumerate() {
            let name = db::shard_name(index);
            let pool = db::create_pool(url, config.max_connections, config.acquire_timeout)
                .map_err(|source| BootstrapError::InvalidUrl {
                    shard: name.clone(),
                    source,
                })?;
            tracing::info!(shard = %name, "Shard pool configured");
            shards.push(Shard::new(name, Arc::new(PgUserShard::new(pool, &config.table))));
        }

        let cache = CacheAside::new(MokaSnapshotCache::new(
            config.cache.max_capacity,
            config.cache.time_to_live,
        ));
        let mut store = UserStore::new(ShardRouter::new(shards)?, cache);

        store = match config.credential_policy {
            CredentialPolicyKind::Plaintext => store.with_credential_policy(PlaintextCredentials),
            CredentialPolicyKind::Argon2 => store.with_credential_policy(Argon2Credentials),
        };

        if let Some(queue) = &config.queue {
            let producer = RestProxyProducer::new(&queue.url, queue.cluster_id.clone())?;
            let publisher = QueuePublisher::new(producer, queue.topic.clone())
                .with_producer_id(queue.producer_id.clone())
                .with_retry_policy(queue.retry);
            tracing::info!(topic = %queue.topic, "Queue publisher enabled");
            store = store.with_publisher(Arc::new(publisher));
        }

        Ok(Self {
            inner: Arc::new(StoreStateInner { config, store }),
        })
    }

    /// Get a reference to the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get a reference to the user store.
    #[must_use]
    pub fn store(&self) -> &UserStore {
        &self.inner.store
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use shardstore_core::UserId;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> StoreConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StoreConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_shard_does_not_block_startup() {
        let state = StoreState::connect(config(&[
            ("SHARDSTORE_SHARD_URLS", "postgres://u:p@127.0.0.1:1/db0"),
            ("SHARDSTORE_DB_ACQUIRE_TIMEOUT_SECS", "1"),
        ]))
        .unwrap();

        assert_eq!(state.store().router().len(), 1);
        assert!(state.store().read_by_id(UserId::new(1), false).await.is_none());
        assert!(state.store().authenticate("ada", "p1").await.is_none());

        let err = state.store().read_all().await.unwrap_err();
        assert!(err.is_connection(), "{err}");
    }

    #[tokio::test]
    async fn test_malformed_shard_url_is_rejected() {
        let result = StoreState::connect(config(&[("SHARDSTORE_SHARD_URLS", "not a url")]));
        assert!(matches!(
            result,
            Err(BootstrapError::InvalidUrl { ref shard, .. }) if shard == "shard_0"
        ));
    }
}
