//! Shardstore - credential-sharded user store.
//!
//! Users are spread over independent `PostgreSQL` shards by a hash of their
//! login and password. Reads by id go through a cache-aside layer and fall
//! back to asking every shard; writes can be published to a broker topic.
//!
//! # Modules
//!
//! - [`store`] - [`UserStore`], the routing and fan-out policy
//! - [`db`] - Shard backends (`PostgreSQL`, plus in-memory with `test-util`)
//! - [`cache`] - Cache-aside layer over `moka`
//! - [`queue`] - Process-wide queue publisher
//! - [`credentials`] - Password storage policies
//! - [`config`] - Environment configuration
//! - [`state`] - Wiring from configuration to a ready store

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod queue;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use state::StoreState;
pub use store::UserStore;
