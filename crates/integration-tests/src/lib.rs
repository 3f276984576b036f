//! Integration tests for shardstore.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios
//! cargo test -p shardstore-integration-tests
//!
//! # Against real shards (comma-separated connection strings)
//! SHARDSTORE_TEST_SHARD_URLS=postgres://localhost/shard0,postgres://localhost/shard1 \
//!     cargo test -p shardstore-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `store_scenarios` - Routing, fan-out and cache behavior over in-memory shards
//! - `publishing` - Queue publishing from the write path
//! - `postgres` - The same operations against live `PostgreSQL` shards

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use secrecy::SecretString;

use shardstore::UserStore;
use shardstore::cache::{CacheAside, MokaSnapshotCache};
use shardstore::db::memory::MemoryShard;
use shardstore::db::{Shard, UserShard, shard_name};
use shardstore::queue::QueuePublisher;
use shardstore::queue::memory::MemoryProducer;
use shardstore_core::{ShardRouter, routing_key};

/// A store over in-memory shards, with handles to inspect each shard.
pub struct Harness {
    pub store: UserStore,
    pub shards: Vec<Arc<MemoryShard>>,
}

impl Harness {
    /// Store over `count` empty shards whose ids start at `1`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::from_shards((0..count).map(|_| MemoryShard::new()).collect())
    }

    /// Store over the given shards, in order.
    ///
    /// # Panics
    ///
    /// Panics if `backends` is empty.
    #[must_use]
    pub fn from_shards(backends: Vec<MemoryShard>) -> Self {
        let shards: Vec<Arc<MemoryShard>> = backends.into_iter().map(Arc::new).collect();
        let named = shards
            .iter()
            .enumerate()
            .map(|(index, backend)| {
                Shard::new(shard_name(index), Arc::clone(backend) as Arc<dyn UserShard>)
            })
            .collect();

        #[allow(clippy::expect_used)]
        let router = ShardRouter::new(named).expect("harness needs at least one shard");
        let store = UserStore::new(router, CacheAside::new(MokaSnapshotCache::new(1_000, None)));

        Self { store, shards }
    }

    /// Attach a publisher sending to `topic` through a fresh in-memory producer.
    #[must_use]
    pub fn with_publisher(mut self, topic: &str) -> (Self, MemoryProducer) {
        let producer = MemoryProducer::new();
        let publisher = QueuePublisher::new(producer.clone(), topic);
        self.store = self.store.with_publisher(Arc::new(publisher));
        (self, producer)
    }

    /// Backend calls made across every shard so far.
    #[must_use]
    pub fn total_accesses(&self) -> usize {
        self.shards.iter().map(|shard| shard.accesses()).sum()
    }

    /// Shard index the credential pair routes to.
    #[must_use]
    pub fn shard_for(&self, login: &str, password: &str) -> usize {
        self.store.router().shard_index(routing_key(login, password))
    }
}

/// Find `count` `(login, password)` pairs that all route to the same shard.
///
/// Logins are `"{prefix}{n}"` for increasing `n`; passwords are fixed.
#[must_use]
pub fn colocated_credentials(
    harness: &Harness,
    prefix: &str,
    password: &str,
    count: usize,
) -> Vec<(String, String)> {
    let target = harness.shard_for(&format!("{prefix}0"), password);
    (0..)
        .map(|n| format!("{prefix}{n}"))
        .filter(|login| harness.shard_for(login, password) == target)
        .take(count)
        .map(|login| (login, password.to_owned()))
        .collect()
}

/// Shard connection strings for the live-database tests, if configured.
#[must_use]
pub fn test_shard_urls() -> Option<Vec<SecretString>> {
    let raw = std::env::var("SHARDSTORE_TEST_SHARD_URLS").ok()?;
    let urls: Vec<SecretString> = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| SecretString::from(url.to_owned()))
        .collect();
    (!urls.is_empty()).then_some(urls)
}
