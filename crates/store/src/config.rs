//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHARDSTORE_SHARD_URLS` - Comma-separated `PostgreSQL` URLs, one per shard,
//!   in routing order
//!
//! ## Optional
//! - `SHARDSTORE_TABLE` - User table name (default: users)
//! - `SHARDSTORE_DB_MAX_CONNECTIONS` - Pool size per shard (default: 10)
//! - `SHARDSTORE_DB_ACQUIRE_TIMEOUT_SECS` - How long an operation waits for a
//!   shard connection before reporting it unreachable (default: 10)
//! - `SHARDSTORE_CACHE_CAPACITY` - Maximum cached snapshots (default: 10000)
//! - `SHARDSTORE_CACHE_TTL_SECS` - Snapshot time-to-live (default: none)
//! - `SHARDSTORE_CREDENTIAL_POLICY` - `plaintext` or `argon2` (default: plaintext)
//! - `SHARDSTORE_QUEUE_URL` - Kafka REST proxy base URL
//! - `SHARDSTORE_QUEUE_CLUSTER` - Kafka cluster ID on the proxy
//! - `SHARDSTORE_QUEUE_TOPIC` - Topic for published users
//! - `SHARDSTORE_PRODUCER_ID` - Producer identity header (default: user writer)
//! - `SHARDSTORE_PUBLISH_MAX_ATTEMPTS` - Attempts before giving up, at least 1
//!   (default: unbounded)
//! - `SHARDSTORE_PUBLISH_BACKOFF_MS` - Pause between attempts (default: 0)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! The three `SHARDSTORE_QUEUE_*` variables enable publishing only when all
//! are set; setting some but not all is an error.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::db::postgres::TableName;
use crate::queue::{DEFAULT_PRODUCER_ID, RetryPolicy};

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which [`CredentialPolicy`](crate::credentials::CredentialPolicy) to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPolicyKind {
    /// Store and compare passwords as given.
    #[default]
    Plaintext,
    /// Store Argon2id hashes.
    Argon2,
}

impl std::str::FromStr for CredentialPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" => Ok(Self::Plaintext),
            "argon2" => Ok(Self::Argon2),
            other => Err(format!("unknown credential policy `{other}`")),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// One connection URL per shard, in routing order (contain passwords)
    pub shard_urls: Vec<SecretString>,
    /// User table name
    pub table: TableName,
    /// Pool size per shard
    pub max_connections: u32,
    /// Wait for a pooled connection before the shard counts as unreachable
    pub acquire_timeout: Duration,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Credential storage policy
    pub credential_policy: CredentialPolicyKind,
    /// Queue configuration (publishing disabled when `None`)
    pub queue: Option<QueueConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Snapshot cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached snapshots
    pub max_capacity: u64,
    /// Optional time-to-live per snapshot
    pub time_to_live: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: None,
        }
    }
}

/// Queue publisher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Kafka REST proxy base URL
    pub url: String,
    /// Kafka cluster ID
    pub cluster_id: String,
    /// Destination topic
    pub topic: String,
    /// Producer identity header value
    pub producer_id: String,
    /// Retry policy for rejected messages
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let shard_urls = parse_shard_urls(&env.required("SHARDSTORE_SHARD_URLS")?)?;
        let table = TableName::parse(&env.or_default("SHARDSTORE_TABLE", "users"))
            .map_err(|e| ConfigError::InvalidEnvVar("SHARDSTORE_TABLE".to_string(), e.to_string()))?;
        let max_connections = env.parsed_or("SHARDSTORE_DB_MAX_CONNECTIONS", 10)?;
        let acquire_timeout =
            Duration::from_secs(env.parsed_or("SHARDSTORE_DB_ACQUIRE_TIMEOUT_SECS", 10)?);
        let cache = CacheConfig {
            max_capacity: env.parsed_or("SHARDSTORE_CACHE_CAPACITY", 10_000)?,
            time_to_live: env
                .parsed::<u64>("SHARDSTORE_CACHE_TTL_SECS")?
                .map(Duration::from_secs),
        };
        let credential_policy = env
            .parsed::<CredentialPolicyKind>("SHARDSTORE_CREDENTIAL_POLICY")?
            .unwrap_or_default();
        let queue = QueueConfig::from_env(&env)?;
        let sentry_dsn = env.optional("SENTRY_DSN");

        Ok(Self {
            shard_urls,
            table,
            max_connections,
            acquire_timeout,
            cache,
            credential_policy,
            queue,
            sentry_dsn,
        })
    }
}

impl QueueConfig {
    fn from_env(env: &Env<'_>) -> Result<Option<Self>, ConfigError> {
        let parts = [
            "SHARDSTORE_QUEUE_URL",
            "SHARDSTORE_QUEUE_CLUSTER",
            "SHARDSTORE_QUEUE_TOPIC",
        ]
        .map(|key| (key, env.optional(key)));

        if parts.iter().all(|(_, value)| value.is_none()) {
            return Ok(None);
        }

        let [url, cluster_id, topic] = parts.map(|(key, value)| {
            value.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        });

        let mut retry = RetryPolicy::unbounded();
        retry.max_attempts = match env.parsed::<u32>("SHARDSTORE_PUBLISH_MAX_ATTEMPTS")? {
            Some(0) => {
                return Err(ConfigError::InvalidEnvVar(
                    "SHARDSTORE_PUBLISH_MAX_ATTEMPTS".to_string(),
                    "must be at least 1".to_string(),
                ));
            }
            attempts => attempts,
        };
        retry.backoff = Duration::from_millis(env.parsed_or("SHARDSTORE_PUBLISH_BACKOFF_MS", 0)?);

        Ok(Some(Self {
            url: url?,
            cluster_id: cluster_id?,
            topic: topic?,
            producer_id: env.or_default("SHARDSTORE_PRODUCER_ID", DEFAULT_PRODUCER_ID),
            retry,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Split a comma-separated URL list, dropping blanks.
fn parse_shard_urls(raw: &str) -> Result<Vec<SecretString>, ConfigError> {
    let urls: Vec<SecretString> = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| SecretString::from(url.to_owned()))
        .collect();

    if urls.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            "SHARDSTORE_SHARD_URLS".to_string(),
            "at least one shard URL is required".to_string(),
        ));
    }
    Ok(urls)
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse an optional variable.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse::<T>()
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }

    /// Parse a variable with a default value.
    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parsed(key)?.unwrap_or(default))
    }
}
