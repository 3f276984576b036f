//! Password storage and comparison policies.
//!
//! The store never compares passwords itself; it asks the configured
//! [`CredentialPolicy`]. Routing is unaffected by the policy: shards are
//! always chosen from the plaintext `(login, password)` the caller supplies.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Errors that can occur while protecting a password.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Password hashing failed.
    #[error("password hashing error: {0}")]
    Hash(String),
}

/// How passwords are stored and checked.
pub trait CredentialPolicy: Send + Sync {
    /// Transform a plaintext password into its stored form.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the password cannot be protected.
    fn protect(&self, password: &str) -> Result<String, CredentialError>;

    /// Check a plaintext candidate against a stored password.
    fn verify(&self, candidate: &str, stored: &str) -> bool;
}

/// Stores passwords as given and compares them for equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCredentials;

impl CredentialPolicy for PlaintextCredentials {
    fn protect(&self, password: &str) -> Result<String, CredentialError> {
        Ok(password.to_owned())
    }

    fn verify(&self, candidate: &str, stored: &str) -> bool {
        candidate == stored
    }
}

/// Stores salted Argon2id hashes in PHC string format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Credentials;

impl CredentialPolicy for Argon2Credentials {
    fn protect(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hash(e.to_string()))
    }

    fn verify(&self, candidate: &str, stored: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(stored) else {
            return false;
        };

        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
