//! User commands.
//!
//! Every command that returns users prints one JSON record per line, in the
//! same shape the cache and the queue carry.
//!
//! # Usage
//!
//! ```bash
//! shardstore create --first-name Ada --last-name Lovelace --login ada --password p1
//! shardstore get 7
//! shardstore list
//! shardstore search --first-name Ad
//! shardstore auth --login ada --password p1
//! ```

use shardstore::{StoreError, UserStore};
use shardstore_core::{User, UserId, codec};
use thiserror::Error;

/// Errors that can occur during user commands.
#[derive(Debug, Error)]
pub enum UserCommandError {
    /// The store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No user has the requested id.
    #[error("User not found: {0}")]
    NotFound(UserId),

    /// Login and password did not match any user.
    #[error("Invalid login or password")]
    InvalidCredentials,
}

/// Fields for a new user, as given on the command line.
#[derive(Debug)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub login: String,
    pub password: String,
    pub email: Option<String>,
    pub gender: Option<String>,
}

impl From<NewUser> for User {
    fn from(input: NewUser) -> Self {
        let mut user = Self::new(input.first_name, input.last_name, input.login, input.password);
        if let Some(email) = input.email {
            user = user.with_email(email);
        }
        if let Some(gender) = input.gender {
            user = user.with_gender(gender);
        }
        user
    }
}

#[allow(clippy::print_stdout)]
fn print_user(user: &User) {
    println!("{}", codec::to_json(user));
}

/// Create a user and print its id.
///
/// # Errors
///
/// Returns an error if the routed shard rejects the insert.
#[allow(clippy::print_stdout)]
pub async fn create(store: &UserStore, input: NewUser) -> Result<(), UserCommandError> {
    let user = User::from(input);
    let id = store.create(&user).await?;
    tracing::info!(%id, "User created");
    println!("{id}");
    Ok(())
}

/// Print the user with `id`.
///
/// # Errors
///
/// Returns [`UserCommandError::NotFound`] if no shard holds the id.
pub async fn get(store: &UserStore, id: UserId, use_cache: bool) -> Result<(), UserCommandError> {
    let user = store
        .read_by_id(id, use_cache)
        .await
        .ok_or(UserCommandError::NotFound(id))?;
    print_user(&user);
    Ok(())
}

/// Print every user on every shard.
///
/// # Errors
///
/// Returns an error if any shard fails.
pub async fn list(store: &UserStore) -> Result<(), UserCommandError> {
    let users = store.read_all().await?;
    tracing::debug!(count = users.len(), "Listed users");
    users.iter().for_each(print_user);
    Ok(())
}

/// Print users whose names start with the given prefixes.
///
/// # Errors
///
/// Returns an error if any shard fails.
pub async fn search(
    store: &UserStore,
    first_name: &str,
    last_name: &str,
) -> Result<(), UserCommandError> {
    let users = store.search(first_name, last_name).await?;
    tracing::debug!(count = users.len(), "Search complete");
    users.iter().for_each(print_user);
    Ok(())
}

/// Print the id matching `login` and `password`.
///
/// # Errors
///
/// Returns [`UserCommandError::InvalidCredentials`] when nothing matches.
#[allow(clippy::print_stdout)]
pub async fn authenticate(
    store: &UserStore,
    login: &str,
    password: &str,
) -> Result<(), UserCommandError> {
    let id = store
        .authenticate(login, password)
        .await
        .ok_or(UserCommandError::InvalidCredentials)?;
    println!("{id}");
    Ok(())
}
