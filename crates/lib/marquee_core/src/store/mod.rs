//! Persistence ports and their adapters.
//!
//! Each concern gets its own async trait so the gatekeeping code can be
//! exercised against [`memory::MemoryStore`] while production runs on
//! [`postgres::PgStore`].

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::auth::permissions::Permissions;
use crate::auth::tokens::{TokenRecord, TokenScope};
use crate::models::filters::{Filters, Metadata};
use crate::models::movie::{Movie, NewMovie};
use crate::models::user::{NewUser, User};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    /// The stored version no longer matches the one the caller read.
    #[error("edit conflict")]
    EditConflict,

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user with version 1.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Write `user` back, conditioned on `user.version`. On success the
    /// passed record carries the new version.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError>;

    /// The owner of a token with this digest and scope whose expiry is still
    /// after `now`.
    async fn user_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Returns the number of tokens removed.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64)
    -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError>;

    async fn get(&self, id: i64) -> Result<Movie, StoreError>;

    /// Write `movie` back, conditioned on `movie.version`. On success the
    /// passed record carries the new version.
    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Movies whose title matches `title` (full-text, empty = any) and that
    /// carry every genre in `genres`.
    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;
}

/// One handle per persistence concern.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_shared(Arc::new(postgres::PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_shared(Arc::new(memory::MemoryStore::new()))
    }

    /// Use one adapter for every concern.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + TokenStore + PermissionStore + MovieStore + 'static,
    {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }
}
