//! Permission codes and the checker that resolves them.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use super::access::{AccessDenied, Identity, require_activated};
use crate::models::user::User;
use crate::store::{PermissionStore, StoreError};

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";
pub const METRICS_READ: &str = "metrics:read";

/// A user's granted permission codes. Membership is exact-match; anything
/// not listed is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn require(&self, code: &str) -> Result<(), AccessDenied> {
        if self.includes(code) {
            Ok(())
        } else {
            Err(AccessDenied::PermissionDenied)
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loads permissions fresh on every check; nothing is cached.
#[derive(Clone)]
pub struct PermissionChecker {
    store: Arc<dyn PermissionStore>,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    pub async fn has_permission(&self, user: &User, code: &str) -> Result<bool, StoreError> {
        Ok(self.store.all_for_user(user.id).await?.includes(code))
    }

    /// Authenticated, then activated, then holding `code`.
    pub async fn authorize<'a>(
        &self,
        identity: &'a Identity,
        code: &str,
    ) -> Result<&'a User, AuthorizeError> {
        let user = require_activated(identity)?;
        self.store.all_for_user(user.id).await?.require(code)?;
        Ok(user)
    }

    pub async fn grant(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        self.store.add_for_user(user_id, codes).await
    }
}
