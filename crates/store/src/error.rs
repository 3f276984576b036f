//! Store-level error type.
//!
//! Only `create`, `read_all`, `search` and `ensure_schema` return these to the
//! caller. Point lookups and authentication log them and report "not found".

use thiserror::Error;

use shardstore_core::UserId;

use crate::credentials::CredentialError;
use crate::db::{Shard, ShardError};

/// Errors surfaced by [`UserStore`](crate::UserStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A shard could not be reached.
    #[error("connection error on {shard}: {message}")]
    Connection {
        /// Shard name.
        shard: String,
        /// Backend message.
        message: String,
    },

    /// A statement failed on a shard (malformed or constraint violation).
    #[error("statement error on {shard}: {message}")]
    Statement {
        /// Shard name.
        shard: String,
        /// Backend message.
        message: String,
    },

    /// The password could not be stored under the credential policy.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// `create` was given a user that already has an identifier.
    #[error("user {0} is already persisted")]
    AlreadyPersisted(UserId),
}

impl StoreError {
    /// Attach the shard name to a backend error.
    #[must_use]
    pub fn on_shard(shard: &Shard, err: ShardError) -> Self {
        let shard = shard.name().to_owned();
        match err {
            ShardError::Connection(message) => Self::Connection { shard, message },
            ShardError::Statement(message) => Self::Statement { shard, message },
        }
    }

    /// Whether the error means a backend was unreachable.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;
