//! The stored user record.

use core::fmt;

use super::UserId;
use crate::routing::routing_key;

/// A user record as persisted on exactly one shard.
///
/// `id` is `None` until the store has persisted the record and is immutable
/// afterwards. The shard a user lives on is decided by `(login, password)`
/// alone; see [`User::routing_key`].
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Store-assigned identifier (`None` before persistence).
    pub id: Option<UserId>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Login name (part of the routing key).
    pub login: String,
    /// Password as stored by the active credential policy (part of the routing key).
    pub password: String,
    /// Optional contact email.
    pub email: Option<String>,
    /// Optional gender.
    pub gender: Option<String>,
}

impl User {
    /// Create an unpersisted user with the required fields.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            login: login.into(),
            password: password.into(),
            email: None,
            gender: None,
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the gender.
    #[must_use]
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Return a copy of this user carrying the given identifier.
    #[must_use]
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the store has assigned an identifier.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Routing key derived from `(login, password)`.
    #[must_use]
    pub fn routing_key(&self) -> u64 {
        routing_key(&self.login, &self.password)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .field("gender", &self.gender)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_unpersisted() {
        let user = User::new("Ada", "Lovelace", "ada", "p1");
        assert!(!user.is_persisted());
        assert!(user.email.is_none());
        assert!(user.gender.is_none());
    }

    #[test]
    fn test_with_id_marks_persisted() {
        let user = User::new("Ada", "Lovelace", "ada", "p1").with_id(UserId::new(7));
        assert_eq!(user.id, Some(UserId::new(7)));
        assert!(user.is_persisted());
    }

    #[test]
    fn test_routing_key_ignores_non_credential_fields() {
        let a = User::new("Ada", "Lovelace", "ada", "p1");
        let b = User::new("Grace", "Hopper", "ada", "p1")
            .with_email("g@example.com")
            .with_id(UserId::new(99));
        assert_eq!(a.routing_key(), b.routing_key());
    }

    #[test]
    fn test_debug_redacts_password() {
        let user = User::new("Ada", "Lovelace", "ada", "hunter2");
        let debug = format!("{user:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }
}
