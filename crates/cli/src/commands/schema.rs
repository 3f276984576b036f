//! Schema bootstrap.
//!
//! # Usage
//!
//! ```bash
//! shardstore init
//! ```

use shardstore::{StoreError, UserStore};

/// Create the user table and its name indexes on every shard.
///
/// # Errors
///
/// Returns an error naming the first shard whose DDL failed.
pub async fn init(store: &UserStore) -> Result<(), StoreError> {
    tracing::info!(shards = store.router().len(), "Ensuring user schema...");
    store.ensure_schema().await?;
    tracing::info!("User schema ready");
    Ok(())
}
