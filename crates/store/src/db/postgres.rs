//! `PostgreSQL` shard backend.
//!
//! One [`PgUserShard`] wraps the pool for one shard database. Queries are
//! built once per shard because the table name is configurable; values are
//! always bound as parameters.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use shardstore_core::{User, UserId};

use super::{ShardError, UserShard};

/// Maximum length of a `PostgreSQL` identifier.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Errors that can occur when validating a table name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableNameError {
    /// The name is empty.
    #[error("table name cannot be empty")]
    Empty,
    /// The name is too long.
    #[error("table name must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The name contains characters outside `[A-Za-z0-9_]` or starts with a digit.
    #[error("table name must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidCharacters,
}

/// A validated, unquoted SQL identifier for the user table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// Parse a table name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than 63 characters, or
    /// not a plain identifier.
    pub fn parse(s: &str) -> Result<Self, TableNameError> {
        if s.is_empty() {
            return Err(TableNameError::Empty);
        }
        if s.len() > MAX_IDENTIFIER_LENGTH {
            return Err(TableNameError::TooLong {
                max: MAX_IDENTIFIER_LENGTH,
            });
        }

        let mut chars = s.chars();
        let starts_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TableNameError::InvalidCharacters);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the table name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self("users".to_owned())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    first_name: String,
    last_name: String,
    login: String,
    password: String,
    email: Option<String>,
    gender: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: Some(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            login: row.login,
            password: row.password,
            email: row.email,
            gender: row.gender,
        }
    }
}

struct Statements {
    create_table: String,
    create_first_name_index: String,
    create_last_name_index: String,
    insert: String,
    select_by_id: String,
    select_by_login: String,
    select_by_prefix: String,
    select_all: String,
}

impl Statements {
    fn for_table(table: &TableName) -> Self {
        let t = table.as_str();
        let columns = "id, first_name, last_name, login, password, email, gender";

        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    id BIGSERIAL PRIMARY KEY,
                    first_name VARCHAR(256) NOT NULL,
                    last_name VARCHAR(256) NOT NULL,
                    login VARCHAR(256) NOT NULL,
                    password VARCHAR(256) NOT NULL,
                    email VARCHAR(256) NULL,
                    gender VARCHAR(16) NULL
                )"
            ),
            create_first_name_index: format!(
                "CREATE INDEX IF NOT EXISTS {t}_first_name_idx ON {t} (first_name)"
            ),
            create_last_name_index: format!(
                "CREATE INDEX IF NOT EXISTS {t}_last_name_idx ON {t} (last_name)"
            ),
            insert: format!(
                "INSERT INTO {t} (first_name, last_name, email, gender, login, password)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id"
            ),
            select_by_id: format!("SELECT {columns} FROM {t} WHERE id = $1 LIMIT 1"),
            select_by_login: format!("SELECT {columns} FROM {t} WHERE login = $1 ORDER BY id"),
            select_by_prefix: format!(
                "SELECT {columns} FROM {t}
                 WHERE first_name LIKE $1 AND last_name LIKE $2
                 ORDER BY id"
            ),
            select_all: format!("SELECT {columns} FROM {t} ORDER BY id"),
        }
    }
}

/// Turn a literal prefix into a `LIKE` pattern with a trailing wildcard.
///
/// `\`, `%` and `_` in the prefix are escaped so they match themselves.
#[must_use]
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// A shard stored in one `PostgreSQL` database.
pub struct PgUserShard {
    pool: PgPool,
    statements: Statements,
}

impl PgUserShard {
    /// Create a shard backend over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, table: &TableName) -> Self {
        Self {
            pool,
            statements: Statements::for_table(table),
        }
    }
}

#[async_trait]
impl UserShard for PgUserShard {
    async fn ensure_schema(&self) -> Result<(), ShardError> {
        sqlx::query(&self.statements.create_table)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.statements.create_first_name_index)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.statements.create_last_name_index)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert(&self, user: &User) -> Result<UserId, ShardError> {
        let id = sqlx::query_scalar::<_, UserId>(&self.statements.insert)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.email.as_deref())
            .bind(user.gender.as_deref())
            .bind(&user.login)
            .bind(&user.password)
            .fetch_one(&self.pool)
            .await?;

        debug!(%id, "Inserted user row");
        Ok(id)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, ShardError> {
        let row = sqlx::query_as::<_, UserRow>(&self.statements.select_by_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_login(&self, login: &str) -> Result<Vec<User>, ShardError> {
        let rows = sqlx::query_as::<_, UserRow>(&self.statements.select_by_login)
            .bind(login)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn search(
        &self,
        first_name_prefix: &str,
        last_name_prefix: &str,
    ) -> Result<Vec<User>, ShardError> {
        let rows = sqlx::query_as::<_, UserRow>(&self.statements.select_by_prefix)
            .bind(like_prefix(first_name_prefix))
            .bind(like_prefix(last_name_prefix))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn scan(&self) -> Result<Vec<User>, ShardError> {
        let rows = sqlx::query_as::<_, UserRow>(&self.statements.select_all)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}
