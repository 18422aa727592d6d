//! In-memory adapter for every store port.
//!
//! Backs the test suites and local runs without a database. All state lives
//! behind one mutex that is never held across an `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use super::{MovieStore, PermissionStore, StoreError, TokenStore, UserStore};
use crate::auth::permissions::Permissions;
use crate::auth::tokens::{TokenRecord, TokenScope};
use crate::models::filters::{Filters, Metadata, SortColumn};
use crate::models::movie::{Movie, NewMovie};
use crate::models::user::{NewUser, User};

#[derive(Default)]
struct Data {
    next_user_id: i64,
    next_movie_id: i64,
    users: BTreeMap<i64, User>,
    tokens: Vec<TokenRecord>,
    grants: BTreeMap<i64, BTreeSet<String>>,
    movies: BTreeMap<i64, Movie>,
}

impl Data {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of persisted tokens, across all users and scopes.
    pub fn token_count(&self) -> usize {
        self.data().tokens.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut data = self.data();
        if data.email_taken(&user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        data.next_user_id += 1;
        let stored = User {
            id: data.next_user_id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: 1,
        };
        data.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.data()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let mut data = self.data();
        if data.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = data
            .users
            .get_mut(&user.id)
            .filter(|stored| stored.version == user.version)
            .ok_or(StoreError::EditConflict)?;
        user.version += 1;
        *stored = user.clone();
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError> {
        self.data().tokens.push(token.clone());
        Ok(())
    }

    async fn user_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let data = self.data();
        let owner = data
            .tokens
            .iter()
            .find(|t| bool::from(t.hash.ct_eq(hash)) && t.scope == scope && t.is_live_at(now))
            .and_then(|t| data.users.get(&t.user_id))
            .cloned();
        Ok(owner)
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let mut data = self.data();
        let before = data.tokens.len();
        data.tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - data.tokens.len()) as u64)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(self
            .data()
            .grants
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        self.data()
            .grants
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }
}

fn title_matches(title: &str, query: &str) -> bool {
    let words: Vec<String> = title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    query
        .split_whitespace()
        .all(|q| words.iter().any(|w| *w == q.to_lowercase()))
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let mut data = self.data();
        data.next_movie_id += 1;
        let stored = Movie {
            id: data.next_movie_id,
            created_at: Utc::now(),
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version: 1,
        };
        data.movies.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        self.data()
            .movies
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut data = self.data();
        let stored = data
            .movies
            .get_mut(&movie.id)
            .filter(|stored| stored.version == movie.version)
            .ok_or(StoreError::EditConflict)?;
        movie.version += 1;
        *stored = movie.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.data()
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let data = self.data();
        let mut matched: Vec<Movie> = data
            .movies
            .values()
            .filter(|m| title_matches(&m.title, title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        let sort = filters.sort();
        matched.sort_by(|a, b| {
            let ordering = match sort.column {
                SortColumn::Id => a.id.cmp(&b.id),
                SortColumn::Title => a.title.cmp(&b.title),
                SortColumn::Year => a.year.cmp(&b.year),
                SortColumn::Runtime => a.runtime.cmp(&b.runtime),
            };
            let ordering = if sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(usize::try_from(filters.offset()).unwrap_or(0))
            .take(usize::try_from(filters.limit()).unwrap_or(0))
            .collect();

        Ok((
            page,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::movie::Runtime;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password_hash: "hash".into(),
            activated: false,
        }
    }

    fn new_movie(title: &str, year: i32, genres: &[&str]) -> NewMovie {
        NewMovie {
            title: title.into(),
            year,
            runtime: Runtime(120),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let store = MemoryStore::new();
        UserStore::insert(&store, new_user("alice@example.com"))
            .await
            .unwrap();
        let err = UserStore::insert(&store, new_user("ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn movie_update_advances_version_then_rejects_stale_copy() {
        let store = MemoryStore::new();
        let created = MovieStore::insert(&store, new_movie("Alien", 1979, &["horror"]))
            .await
            .unwrap();

        // Two callers read the record at the same version.
        let mut first = created.clone();
        let mut second = created.clone();
        first.version = 3;
        second.version = 3;
        {
            let mut data = store.data();
            data.movies.get_mut(&created.id).unwrap().version = 3;
        }

        first.title = "Aliens".into();
        MovieStore::update(&store, &mut first).await.unwrap();
        assert_eq!(first.version, 4);

        second.year = 1986;
        let err = MovieStore::update(&store, &mut second).await.unwrap_err();
        assert!(matches!(err, StoreError::EditConflict));
        assert_eq!(second.version, 3);

        let stored = MovieStore::get(&store, created.id).await.unwrap();
        assert_eq!(stored.title, "Aliens");
        assert_eq!(stored.year, 1979);
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn user_update_is_version_checked() {
        let store = MemoryStore::new();
        let mut user = UserStore::insert(&store, new_user("bob@example.com"))
            .await
            .unwrap();
        let mut stale = user.clone();

        user.activated = true;
        UserStore::update(&store, &mut user).await.unwrap();
        assert_eq!(user.version, 2);

        stale.name = "Robert".into();
        let err = UserStore::update(&store, &mut stale).await.unwrap_err();
        assert!(matches!(err, StoreError::EditConflict));
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = MemoryStore::new();
        MovieStore::insert(&store, new_movie("The Godfather", 1972, &["crime", "drama"]))
            .await
            .unwrap();
        MovieStore::insert(&store, new_movie("Heat", 1995, &["crime"]))
            .await
            .unwrap();
        MovieStore::insert(&store, new_movie("Up", 2009, &["animation"]))
            .await
            .unwrap();

        let filters = Filters {
            page: 1,
            page_size: 1,
            sort: "-year".into(),
        };
        let (page, meta) = store
            .list("", &["crime".to_string()], &filters)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "Heat");
        assert_eq!(meta.total_records, 2);
        assert_eq!(meta.last_page, 2);

        let (page, _) = store
            .list("godfather", &[], &Filters::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].year, 1972);
    }

    #[tokio::test]
    async fn delete_missing_movie_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            MovieStore::delete(&store, 42).await,
            Err(StoreError::NotFound)
        ));
    }
}
