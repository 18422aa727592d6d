//! User accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validation::{Validator, validate_email, validate_password_plaintext};

/// A registered account.
///
/// `version` backs optimistic locking: a store update only succeeds when the
/// stored version still equals this one, and bumps it on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

/// Validate registration input. The password is checked in plaintext form,
/// before it is hashed.
pub fn validate_registration(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_omits_hash_and_version() {
        let user = User {
            id: 7,
            created_at: Utc::now(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$12$secret".into(),
            activated: false,
            version: 3,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["activated"], false);
    }

    #[test]
    fn registration_requires_name() {
        let mut v = Validator::new();
        validate_registration(&mut v, "", "alice@example.com", "pa55word");
        let errors = v.finish().unwrap_err();
        assert!(errors.contains_key("name"));
        assert_eq!(errors.len(), 1);
    }
}
