//! Scoped credential tokens.
//!
//! A token is 16 random bytes rendered as 26 base32 characters. Only the
//! SHA-256 digest is persisted; the plaintext is handed back exactly once,
//! at issuance.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::AuthError;
use crate::clock::Clock;
use crate::models::user::User;
use crate::store::TokenStore;
use crate::validation::Validator;

/// Random bytes per token.
const TOKEN_BYTES: usize = 16;

/// Length of the base32 plaintext.
pub const TOKEN_LENGTH: usize = 26;

/// What a token may be used for. A token only ever resolves in its own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Authentication,
    Activation,
    PasswordReset,
}

impl TokenScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Activation => "activation",
            Self::PasswordReset => "password-reset",
        }
    }

    /// Default lifetime for tokens of this scope.
    pub fn ttl(self) -> Duration {
        match self {
            Self::Authentication => Duration::hours(24),
            Self::Activation => Duration::days(3),
            Self::PasswordReset => Duration::minutes(45),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted form of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl TokenRecord {
    /// Valid strictly before `expiry`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }
}

/// A freshly issued token. Serialises to `{"token", "expiry"}`.
pub struct IssuedToken {
    pub plaintext: String,
    pub record: TokenRecord,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("plaintext", &"<redacted>")
            .field("record", &self.record)
            .finish()
    }
}

impl Serialize for IssuedToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("IssuedToken", 2)?;
        s.serialize_field("token", &self.plaintext)?;
        s.serialize_field("expiry", &self.record.expiry)?;
        s.end()
    }
}

/// True for exactly 26 characters of the RFC 4648 base32 alphabet.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

/// Field-level check for a token supplied in a request body.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_LENGTH, "token", "must be 26 bytes long");
}

/// SHA-256 digest of a plaintext token.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Issues, resolves and revokes tokens against a [`TokenStore`].
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn issue(
        &self,
        user_id: i64,
        ttl: Duration,
        scope: TokenScope,
    ) -> Result<IssuedToken, AuthError> {
        let plaintext = generate_plaintext();
        let record = TokenRecord {
            hash: hash_token(&plaintext),
            user_id,
            expiry: self.clock.now() + ttl,
            scope,
        };
        self.store.insert(&record).await?;
        debug!(user_id, scope = %scope, expiry = %record.expiry, "Issued token");
        Ok(IssuedToken { plaintext, record })
    }

    /// Issue with the scope's default lifetime.
    pub async fn issue_for_scope(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<IssuedToken, AuthError> {
        self.issue(user_id, scope.ttl(), scope).await
    }

    /// Resolve a plaintext token to its owner.
    ///
    /// Malformed input is rejected before touching the store.
    pub async fn resolve(&self, scope: TokenScope, plaintext: &str) -> Result<User, AuthError> {
        if !is_well_formed(plaintext) {
            return Err(AuthError::InvalidCredentialFormat);
        }
        self.store
            .user_for_token(scope, &hash_token(plaintext), self.clock.now())
            .await?
            .ok_or(AuthError::CredentialNotRecognized)
    }

    /// Delete every token of `scope` belonging to `user_id`.
    pub async fn revoke_all(&self, scope: TokenScope, user_id: i64) -> Result<u64, AuthError> {
        let removed = self.store.delete_all_for_user(scope, user_id).await?;
        debug!(user_id, scope = %scope, removed, "Revoked tokens");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::user::NewUser;
    use crate::store::UserStore;
    use crate::store::memory::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, TokenManager, User) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = TokenManager::new(store.clone(), clock.clone());
        let user = UserStore::insert(
            store.as_ref(),
            NewUser {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                password_hash: "hash".into(),
                activated: true,
            },
        )
        .await
        .unwrap();
        (store, clock, manager, user)
    }

    #[test]
    fn generated_tokens_are_well_formed() {
        for _ in 0..32 {
            let token = generate_plaintext();
            assert_eq!(token.len(), TOKEN_LENGTH);
            assert!(is_well_formed(&token), "{token}");
        }
    }

    #[test]
    fn format_check() {
        assert!(is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert!(is_well_formed("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));
        assert!(!is_well_formed("abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY1"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn body_token_validation() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert_eq!(v.finish().unwrap_err()["token"], "must be 26 bytes long");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "");
        assert_eq!(v.finish().unwrap_err()["token"], "must be provided");
    }

    #[test]
    fn digest_is_sha256() {
        assert_eq!(hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ").len(), 32);
        assert_eq!(hash_token("x"), hash_token("x"));
    }

    #[test]
    fn debug_never_shows_plaintext() {
        let issued = IssuedToken {
            plaintext: "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU".into(),
            record: TokenRecord {
                hash: hash_token("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"),
                user_id: 1,
                expiry: Utc::now(),
                scope: TokenScope::Authentication,
            },
        };
        let rendered = format!("{issued:?}");
        assert!(!rendered.contains("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));

        let json = serde_json::to_value(&issued).unwrap();
        assert_eq!(json["token"], "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU");
        assert!(json.get("expiry").is_some());
        assert!(json.get("hash").is_none());
    }

    #[test]
    fn scope_lifetimes() {
        assert_eq!(TokenScope::Authentication.ttl(), Duration::hours(24));
        assert_eq!(TokenScope::PasswordReset.ttl(), Duration::minutes(45));
        assert_eq!(TokenScope::Activation.ttl(), Duration::days(3));
    }

    #[tokio::test]
    async fn only_the_digest_is_stored() {
        let (store, _clock, manager, user) = setup().await;
        let issued = manager
            .issue_for_scope(user.id, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(store.token_count(), 1);
        assert_ne!(issued.record.hash, issued.plaintext.as_bytes());
        assert_eq!(issued.record.hash, hash_token(&issued.plaintext));
    }

    #[tokio::test]
    async fn expiry_boundary() {
        let (_store, clock, manager, user) = setup().await;
        let issued = manager
            .issue(user.id, Duration::hours(1), TokenScope::Authentication)
            .await
            .unwrap();

        clock.advance(Duration::minutes(59) + Duration::seconds(59));
        let owner = manager
            .resolve(TokenScope::Authentication, &issued.plaintext)
            .await
            .unwrap();
        assert_eq!(owner.id, user.id);

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            manager
                .resolve(TokenScope::Authentication, &issued.plaintext)
                .await,
            Err(AuthError::CredentialNotRecognized)
        ));
    }

    #[tokio::test]
    async fn wrong_scope_looks_unknown() {
        let (_store, _clock, manager, user) = setup().await;
        let issued = manager
            .issue_for_scope(user.id, TokenScope::Activation)
            .await
            .unwrap();

        let wrong_scope = manager
            .resolve(TokenScope::Authentication, &issued.plaintext)
            .await
            .unwrap_err();
        let unknown = manager
            .resolve(TokenScope::Authentication, "ABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .await
            .unwrap_err();
        assert!(matches!(wrong_scope, AuthError::CredentialNotRecognized));
        assert!(matches!(unknown, AuthError::CredentialNotRecognized));
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_before_lookup() {
        let (_store, _clock, manager, _user) = setup().await;
        assert!(matches!(
            manager.resolve(TokenScope::Authentication, "short").await,
            Err(AuthError::InvalidCredentialFormat)
        ));
    }

    #[tokio::test]
    async fn revoke_all_invalidates_scope_only() {
        let (store, _clock, manager, user) = setup().await;
        let first = manager
            .issue_for_scope(user.id, TokenScope::Authentication)
            .await
            .unwrap();
        let second = manager
            .issue_for_scope(user.id, TokenScope::Authentication)
            .await
            .unwrap();
        let reset = manager
            .issue_for_scope(user.id, TokenScope::PasswordReset)
            .await
            .unwrap();

        let removed = manager
            .revoke_all(TokenScope::Authentication, user.id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.token_count(), 1);

        for plaintext in [&first.plaintext, &second.plaintext] {
            assert!(matches!(
                manager.resolve(TokenScope::Authentication, plaintext).await,
                Err(AuthError::CredentialNotRecognized)
            ));
        }
        assert!(
            manager
                .resolve(TokenScope::PasswordReset, &reset.plaintext)
                .await
                .is_ok()
        );
    }
}
