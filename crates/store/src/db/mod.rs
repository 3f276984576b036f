//! Shard backends for the user table.
//!
//! # Topology
//!
//! Each shard is an independent `PostgreSQL` database holding a disjoint subset
//! of users in the same table. Shards are registered in a fixed order; that
//! order is both the routing order and the fan-out order.
//!
//! ## Table
//!
//! - `id` - `BIGSERIAL` primary key (allocated per shard)
//! - `first_name`, `last_name`, `login`, `password` - required strings
//! - `email`, `gender` - optional strings
//! - secondary indexes on `first_name` and `last_name`
//!
//! # Schema bootstrap
//!
//! Tables are created on every shard by:
//! ```bash
//! cargo run -p shardstore-cli -- init
//! ```

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

use shardstore_core::{User, UserId};

pub use postgres::PgUserShard;

/// Errors a single shard can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardError {
    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The statement was malformed or violated a constraint.
    #[error("statement error: {0}")]
    Statement(String),
}

impl From<sqlx::Error> for ShardError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err.to_string()),
            _ => Self::Statement(err.to_string()),
        }
    }
}

/// Operations one shard must support.
///
/// Every call acquires its own backend session; implementations must be safe
/// to call concurrently.
#[async_trait]
pub trait UserShard: Send + Sync {
    /// Create the user table and its indexes if they do not exist.
    async fn ensure_schema(&self) -> Result<(), ShardError>;

    /// Insert a user and return the identifier the backend assigned.
    async fn insert(&self, user: &User) -> Result<UserId, ShardError>;

    /// Point-select by identifier.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, ShardError>;

    /// All users with exactly this login, in id order.
    async fn find_by_login(&self, login: &str) -> Result<Vec<User>, ShardError>;

    /// Users whose first and last names start with the given prefixes, in id order.
    ///
    /// Matching is case-sensitive and the prefixes are literal.
    async fn search(
        &self,
        first_name_prefix: &str,
        last_name_prefix: &str,
    ) -> Result<Vec<User>, ShardError>;

    /// Every user on the shard, in id order.
    async fn scan(&self) -> Result<Vec<User>, ShardError>;
}

/// A named handle to one shard.
///
/// Cheap to clone; the backend is shared.
#[derive(Clone)]
pub struct Shard {
    name: String,
    backend: Arc<dyn UserShard>,
}

impl Shard {
    /// Create a shard handle.
    pub fn new(name: impl Into<String>, backend: Arc<dyn UserShard>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    /// Shard name (used as the routing hint in logs).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shard backend.
    #[must_use]
    pub fn backend(&self) -> &dyn UserShard {
        self.backend.as_ref()
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard").field("name", &self.name).finish()
    }
}

/// Conventional name for the shard at `index`.
#[must_use]
pub fn shard_name(index: usize) -> String {
    format!("shard_{index}")
}

/// Create a lazily connecting `PostgreSQL` pool for one shard.
///
/// No connection is opened here. An unreachable shard surfaces as
/// `ShardError::Connection` from the first operation that needs it, once
/// `acquire_timeout` has elapsed.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
/// * `acquire_timeout` - How long an operation waits for a connection
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection string cannot be parsed.
pub fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = database_url.expose_secret().parse()?;

    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_lazy_with(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_classification() {
        assert!(matches!(
            ShardError::from(sqlx::Error::PoolTimedOut),
            ShardError::Connection(_)
        ));
        assert!(matches!(
            ShardError::from(sqlx::Error::PoolClosed),
            ShardError::Connection(_)
        ));
        assert!(matches!(
            ShardError::from(sqlx::Error::RowNotFound),
            ShardError::Statement(_)
        ));
        assert!(matches!(
            ShardError::from(sqlx::Error::ColumnNotFound("login".to_owned())),
            ShardError::Statement(_)
        ));
    }

    #[test]
    fn test_shard_name() {
        assert_eq!(shard_name(0), "shard_0");
        assert_eq!(shard_name(12), "shard_12");
    }
}
