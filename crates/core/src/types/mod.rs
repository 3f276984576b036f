//! Core types for shardstore.
//!
//! This module provides type-safe wrappers for the stored entity.

pub mod id;
pub mod user;

pub use id::UserId;
pub use user::User;
