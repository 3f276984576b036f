//! Shardstore Core - user record, codec and shard routing.
//!
//! This crate provides the pieces of the sharded user store that need no I/O.
//! It is shared by:
//! - `shardstore` - Shard-aware repository, cache-aside layer and queue publisher
//! - `shardstore-cli` - Command-line wiring for schema bootstrap and store operations
//!
//! # Architecture
//!
//! The core crate contains only types, pure functions and the router - no
//! database access, no HTTP clients. Anything that talks to a backend lives in
//! the `shardstore` crate.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs and the [`User`] record
//! - [`codec`] - Flat JSON record form shared by cache and queue payloads
//! - [`routing`] - Credential hashing and the [`ShardRouter`]

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod codec;
pub mod routing;
pub mod types;

pub use codec::{DecodeError, Record};
pub use routing::{RouterError, ShardRouter, routing_key};
pub use types::{User, UserId};
