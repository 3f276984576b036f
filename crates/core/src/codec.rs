//! Flat record form of a [`User`].
//!
//! The same record is used as the cache snapshot and as the queue payload:
//!
//! ```json
//! {"id": 7, "first_name": "Ada", "last_name": "Lovelace",
//!  "email": "ada@example.com", "gender": "f", "login": "ada", "password": "p1"}
//! ```
//!
//! `id` is an integer and is omitted for unpersisted users. Every other value
//! is a string. `email` and `gender` are omitted when absent; decoding also
//! accepts `null` for them.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{User, UserId};

/// A structured (map-like) user record.
pub type Record = Map<String, Value>;

const ID: &str = "id";
const FIRST_NAME: &str = "first_name";
const LAST_NAME: &str = "last_name";
const EMAIL: &str = "email";
const GENDER: &str = "gender";
const LOGIN: &str = "login";
const PASSWORD: &str = "password";

/// Errors that can occur when decoding a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input is not a JSON object.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A required field is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field holds a value of the wrong JSON type.
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },
}

/// Encode a user field-for-field.
#[must_use]
pub fn encode(user: &User) -> Record {
    let mut record = Record::new();

    if let Some(id) = user.id {
        record.insert(ID.to_owned(), Value::from(id.as_i64()));
    }
    record.insert(FIRST_NAME.to_owned(), Value::from(user.first_name.as_str()));
    record.insert(LAST_NAME.to_owned(), Value::from(user.last_name.as_str()));
    if let Some(email) = &user.email {
        record.insert(EMAIL.to_owned(), Value::from(email.as_str()));
    }
    if let Some(gender) = &user.gender {
        record.insert(GENDER.to_owned(), Value::from(gender.as_str()));
    }
    record.insert(LOGIN.to_owned(), Value::from(user.login.as_str()));
    record.insert(PASSWORD.to_owned(), Value::from(user.password.as_str()));

    record
}

/// Decode a record into a user.
///
/// # Errors
///
/// Returns `DecodeError::MissingField` if a required field is absent and
/// `DecodeError::WrongType` if a field has the wrong JSON type.
pub fn decode(record: &Record) -> Result<User, DecodeError> {
    let id = match record.get(ID) {
        None | Some(Value::Null) => None,
        Some(value) => Some(UserId::new(value.as_i64().ok_or(DecodeError::WrongType {
            field: ID,
            expected: "an integer",
        })?)),
    };

    Ok(User {
        id,
        first_name: required_string(record, FIRST_NAME)?,
        last_name: required_string(record, LAST_NAME)?,
        login: required_string(record, LOGIN)?,
        password: required_string(record, PASSWORD)?,
        email: optional_string(record, EMAIL)?,
        gender: optional_string(record, GENDER)?,
    })
}

/// Serialize a user to its JSON record string.
#[must_use]
pub fn to_json(user: &User) -> String {
    Value::Object(encode(user)).to_string()
}

/// Parse a JSON record string into a user.
///
/// # Errors
///
/// Returns `DecodeError::Malformed` if the input is not a JSON object, or any
/// error [`decode`] returns.
pub fn from_json(input: &str) -> Result<User, DecodeError> {
    let value: Value =
        serde_json::from_str(input).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match value {
        Value::Object(record) => decode(&record),
        _ => Err(DecodeError::Malformed("expected a JSON object".to_owned())),
    }
}

fn required_string(record: &Record, field: &'static str) -> Result<String, DecodeError> {
    optional_string(record, field)?.ok_or(DecodeError::MissingField(field))
}

fn optional_string(record: &Record, field: &'static str) -> Result<Option<String>, DecodeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ada() -> User {
        User::new("Ada", "Lovelace", "ada", "p1")
            .with_email("ada@example.com")
            .with_gender("f")
            .with_id(UserId::new(7))
    }

    #[test]
    fn test_encode_uses_flat_field_names() {
        let record = encode(&ada());
        assert_eq!(record.get("id"), Some(&Value::from(7)));
        assert_eq!(record.get("first_name"), Some(&Value::from("Ada")));
        assert_eq!(record.get("last_name"), Some(&Value::from("Lovelace")));
        assert_eq!(record.get("email"), Some(&Value::from("ada@example.com")));
        assert_eq!(record.get("gender"), Some(&Value::from("f")));
        assert_eq!(record.get("login"), Some(&Value::from("ada")));
        assert_eq!(record.get("password"), Some(&Value::from("p1")));
        assert_eq!(record.len(), 7);
    }

    #[test]
    fn test_roundtrip_full_and_sparse_users() {
        let users = [
            ada(),
            User::new("Grace", "Hopper", "grace", "cobol"),
            User::new("", "", "", "").with_email(""),
        ];
        for user in users {
            assert_eq!(decode(&encode(&user)).unwrap(), user);
            assert_eq!(from_json(&to_json(&user)).unwrap(), user);
        }
    }

    #[test]
    fn test_unpersisted_user_has_no_id_key() {
        let record = encode(&User::new("Ada", "Lovelace", "ada", "p1"));
        assert!(!record.contains_key("id"));
        assert!(!record.contains_key("email"));
    }

    #[test]
    fn test_decode_missing_required_field() {
        let mut record = encode(&ada());
        record.remove("login");
        assert!(matches!(
            decode(&record),
            Err(DecodeError::MissingField("login"))
        ));
    }

    #[test]
    fn test_decode_null_optional_fields() {
        let user = from_json(
            r#"{"id":3,"first_name":"A","last_name":"B","login":"l","password":"p","email":null,"gender":null}"#,
        )
        .unwrap();
        assert_eq!(user.id, Some(UserId::new(3)));
        assert!(user.email.is_none());
        assert!(user.gender.is_none());
    }

    #[test]
    fn test_decode_wrong_types() {
        let bad_id = r#"{"id":"7","first_name":"A","last_name":"B","login":"l","password":"p"}"#;
        assert!(matches!(
            from_json(bad_id),
            Err(DecodeError::WrongType { field: "id", .. })
        ));

        let bad_name = r#"{"first_name":1,"last_name":"B","login":"l","password":"p"}"#;
        assert!(matches!(
            from_json(bad_name),
            Err(DecodeError::WrongType {
                field: "first_name",
                ..
            })
        ));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(from_json("{"), Err(DecodeError::Malformed(_))));
        assert!(matches!(from_json("[1,2]"), Err(DecodeError::Malformed(_))));
    }
}
