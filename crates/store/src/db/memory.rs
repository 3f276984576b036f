//! In-memory shard for tests.
//!
//! Rows live in a `Vec` in insertion order, identifiers come from a per-shard
//! counter, and every backend call bumps an access counter so tests can tell
//! whether a read hit the store. A failure can be injected to make every call
//! return a given [`ShardError`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use shardstore_core::{User, UserId};

use super::{ShardError, UserShard};

#[derive(Debug)]
struct State {
    rows: Vec<User>,
    next_id: i64,
    failure: Option<ShardError>,
}

/// A shard backed by a `Vec`.
#[derive(Debug)]
pub struct MemoryShard {
    state: Mutex<State>,
    accesses: AtomicUsize,
}

impl Default for MemoryShard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShard {
    /// Empty shard whose first assigned id is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Empty shard whose first assigned id is `next_id`.
    #[must_use]
    pub const fn starting_at(next_id: i64) -> Self {
        Self {
            state: Mutex::new(State {
                rows: Vec::new(),
                next_id,
                failure: None,
            }),
            accesses: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<ShardError>) {
        self.lock().failure = error;
    }

    /// Number of backend calls made so far.
    #[must_use]
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    /// Copy of every stored row.
    #[must_use]
    pub fn rows(&self) -> Vec<User> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> Result<MutexGuard<'_, State>, ShardError> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        match &state.failure {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }

    fn select(&self, predicate: impl Fn(&User) -> bool) -> Result<Vec<User>, ShardError> {
        let state = self.enter()?;
        Ok(state.rows.iter().filter(|u| predicate(u)).cloned().collect())
    }
}

#[async_trait]
impl UserShard for MemoryShard {
    async fn ensure_schema(&self) -> Result<(), ShardError> {
        self.enter().map(|_| ())
    }

    async fn insert(&self, user: &User) -> Result<UserId, ShardError> {
        let mut state = self.enter()?;
        let id = UserId::new(state.next_id);
        state.next_id += 1;
        state.rows.push(User {
            id: Some(id),
            ..user.clone()
        });
        Ok(id)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, ShardError> {
        Ok(self.select(|u| u.id == Some(id))?.into_iter().next())
    }

    async fn find_by_login(&self, login: &str) -> Result<Vec<User>, ShardError> {
        self.select(|u| u.login == login)
    }

    async fn search(
        &self,
        first_name_prefix: &str,
        last_name_prefix: &str,
    ) -> Result<Vec<User>, ShardError> {
        self.select(|u| {
            u.first_name.starts_with(first_name_prefix) && u.last_name.starts_with(last_name_prefix)
        })
    }

    async fn scan(&self) -> Result<Vec<User>, ShardError> {
        self.select(|_| true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let shard = MemoryShard::starting_at(7);
        let a = shard.insert(&User::new("A", "B", "a", "1")).await.unwrap();
        let b = shard.insert(&User::new("C", "D", "c", "2")).await.unwrap();
        assert_eq!(a, UserId::new(7));
        assert_eq!(b, UserId::new(8));
        assert_eq!(shard.accesses(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let shard = MemoryShard::new();
        shard.set_failure(Some(ShardError::Connection("down".to_owned())));
        assert!(matches!(
            shard.scan().await,
            Err(ShardError::Connection(_))
        ));
        shard.set_failure(None);
        assert!(shard.scan().await.unwrap().is_empty());
        assert_eq!(shard.accesses(), 2);
    }

    #[tokio::test]
    async fn test_search_is_case_sensitive_prefix() {
        let shard = MemoryShard::new();
        shard.insert(&User::new("Ada", "Lovelace", "ada", "p1")).await.unwrap();
        shard.insert(&User::new("ada", "lovelace", "ada2", "p2")).await.unwrap();

        let hits = shard.search("Ad", "Love").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].login, "ada");
    }
}
