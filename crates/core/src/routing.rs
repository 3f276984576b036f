//! Credential-keyed shard routing.
//!
//! A user's shard is `route(routing_key(login, password))`. The routing key is
//! the first eight bytes of SHA-256 over `login ++ password`, read big-endian,
//! so it is stable across processes, platforms and releases. Two credential
//! pairs that collide simply share a shard.
//!
//! Because the key is derived from credentials, any lookup that does not know
//! both login and password (by id, by name prefix, full scan) has to visit
//! every shard. [`ShardRouter::all_shards`] exists for that fan-out.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur when building a router.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The topology has no shards.
    #[error("shard topology is empty")]
    EmptyTopology,
}

/// Compute the routing key for a credential pair.
#[must_use]
pub fn routing_key(login: &str, password: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(login.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    digest
        .first_chunk::<8>()
        .map_or(0, |bytes| u64::from_be_bytes(*bytes))
}

/// Maps routing keys onto a fixed, ordered set of shard handles.
///
/// The handle order is the registration order and is also the fan-out order.
#[derive(Debug, Clone)]
pub struct ShardRouter<H> {
    shards: Vec<H>,
}

impl<H> ShardRouter<H> {
    /// Build a router over the given shards.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::EmptyTopology` if `shards` is empty.
    pub fn new(shards: Vec<H>) -> Result<Self, RouterError> {
        if shards.is_empty() {
            return Err(RouterError::EmptyTopology);
        }
        Ok(Self { shards })
    }

    /// Index of the shard that owns `key`.
    #[must_use]
    pub fn shard_index(&self, key: u64) -> usize {
        let len = self.shards.len() as u64;
        usize::try_from(key % len).unwrap_or_default()
    }

    /// Shard that owns `key`.
    #[must_use]
    #[allow(clippy::indexing_slicing)] // shard_index is always < len and len > 0
    pub fn route(&self, key: u64) -> &H {
        &self.shards[self.shard_index(key)]
    }

    /// Shard that owns the given credential pair.
    #[must_use]
    pub fn route_credentials(&self, login: &str, password: &str) -> &H {
        self.route(routing_key(login, password))
    }

    /// All shards in registration order.
    #[must_use]
    pub fn all_shards(&self) -> &[H] {
        &self.shards
    }

    /// Number of shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always `false`; a router cannot be built without shards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_topology_rejected() {
        let result = ShardRouter::<&str>::new(vec![]);
        assert_eq!(result.unwrap_err(), RouterError::EmptyTopology);
    }

    #[test]
    fn test_routing_key_is_deterministic() {
        assert_eq!(routing_key("ada", "p1"), routing_key("ada", "p1"));
        assert_ne!(routing_key("ada", "p1"), routing_key("ada", "p2"));
    }

    #[test]
    fn test_routing_key_hashes_concatenation() {
        // Only the concatenation matters, not where login ends.
        assert_eq!(routing_key("ada", "p1"), routing_key("adap", "1"));
        assert_eq!(routing_key("ada", "p1"), routing_key("adap1", ""));
    }

    #[test]
    fn test_routing_key_known_value() {
        // SHA-256("abc") = ba7816bf8f01cfea...
        assert_eq!(routing_key("ab", "c"), 0xba78_16bf_8f01_cfea);
    }

    #[test]
    fn test_route_is_stable_across_calls() {
        let router = ShardRouter::new(vec!["s0", "s1", "s2", "s3"]).unwrap();
        let pairs = [("ada", "p1"), ("grace", "cobol"), ("alan", "enigma"), ("", "")];
        for (login, password) in pairs {
            let first = router.route_credentials(login, password);
            for _ in 0..10 {
                assert_eq!(router.route_credentials(login, password), first);
            }
        }
    }

    #[test]
    fn test_route_uses_modulo_over_shard_count() {
        let router = ShardRouter::new(vec![0_u8, 1, 2]).unwrap();
        assert_eq!(*router.route(0), 0);
        assert_eq!(*router.route(4), 1);
        assert_eq!(*router.route(u64::MAX), u8::try_from(u64::MAX % 3).unwrap());
    }

    #[test]
    fn test_all_shards_keeps_registration_order() {
        let router = ShardRouter::new(vec!["a", "b", "c"]).unwrap();
        assert_eq!(router.all_shards(), &["a", "b", "c"]);
        assert_eq!(router.len(), 3);
        assert!(!router.is_empty());
    }
}
