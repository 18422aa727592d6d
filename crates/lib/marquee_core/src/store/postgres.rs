//! PostgreSQL adapter for every store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{MovieStore, PermissionStore, StoreError, TokenStore, UserStore};
use crate::auth::permissions::Permissions;
use crate::auth::tokens::{TokenRecord, TokenScope};
use crate::models::filters::{Filters, Metadata};
use crate::models::movie::{Movie, NewMovie, Runtime};
use crate::models::user::{NewUser, User};

type UserRow = (i64, DateTime<Utc>, String, String, String, bool, i32);
type MovieRow = (i64, DateTime<Utc>, String, i32, i32, Vec<String>, i32);

const USER_COLUMNS: &str =
    "users.id, users.created_at, users.name, users.email::text, users.password_hash, users.activated, users.version";

fn user_from_row(
    (id, created_at, name, email, password_hash, activated, version): UserRow,
) -> User {
    User {
        id,
        created_at,
        name,
        email,
        password_hash,
        activated,
        version,
    }
}

fn movie_from_row((id, created_at, title, year, runtime, genres, version): MovieRow) -> Movie {
    Movie {
        id,
        created_at,
        title,
        year,
        runtime: Runtime(runtime),
        genres,
        version,
    }
}

/// Map a unique-constraint violation on `users.email` to `DuplicateEmail`.
fn email_conflict(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Db(e),
    }
}

/// sqlx-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let (id, created_at, version) = sqlx::query_as::<_, (i64, DateTime<Utc>, i32)>(
            "INSERT INTO users (name, email, password_hash, activated) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, created_at, version",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.activated)
        .fetch_one(&self.pool)
        .await
        .map_err(email_conflict)?;

        Ok(User {
            id,
            created_at,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version,
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let version = sqlx::query_scalar::<_, i32>(
            "UPDATE users \
             SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1 \
             WHERE id = $5 AND version = $6 \
             RETURNING version",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.activated)
        .bind(user.id)
        .bind(user.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(email_conflict)?
        .ok_or(StoreError::EditConflict)?;

        user.version = version;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} \
             FROM users \
             INNER JOIN tokens ON users.id = tokens.user_id \
             WHERE tokens.hash = $1 \
               AND tokens.scope = $2 \
               AND tokens.expiry > $3"
        ))
        .bind(hash)
        .bind(scope.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT permissions.code \
             FROM permissions \
             INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id \
             WHERE users_permissions.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes.into_iter().collect())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        sqlx::query(
            "INSERT INTO users_permissions (user_id, permission_id) \
             SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(&codes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MovieStore for PgStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let (id, created_at, version) = sqlx::query_as::<_, (i64, DateTime<Utc>, i32)>(
            "INSERT INTO movies (title, year, runtime, genres) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, created_at, version",
        )
        .bind(&movie.title)
        .bind(movie.year)
        .bind(movie.runtime.0)
        .bind(&movie.genres)
        .fetch_one(&self.pool)
        .await?;

        Ok(Movie {
            id,
            created_at,
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version,
        })
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let row = sqlx::query_as::<_, MovieRow>(
            "SELECT id, created_at, title, year, runtime, genres, version \
             FROM movies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(movie_from_row).ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let version = sqlx::query_scalar::<_, i32>(
            "UPDATE movies \
             SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1 \
             WHERE id = $5 AND version = $6 \
             RETURNING version",
        )
        .bind(&movie.title)
        .bind(movie.year)
        .bind(movie.runtime.0)
        .bind(&movie.genres)
        .bind(movie.id)
        .bind(movie.version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::EditConflict)?;

        movie.version = version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let sort = filters.sort();
        // Column and direction come from the `SortColumn` safelist, never
        // from raw input.
        let query = format!(
            "SELECT count(*) OVER(), id, created_at, title, year, runtime, genres, version \
             FROM movies \
             WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '') \
               AND (genres @> $2 OR $2 = '{{}}') \
             ORDER BY {} {}, id ASC \
             LIMIT $3 OFFSET $4",
            sort.column.as_str(),
            sort.direction(),
        );

        let rows = sqlx::query_as::<
            _,
            (i64, i64, DateTime<Utc>, String, i32, i32, Vec<String>, i32),
        >(&query)
        .bind(title)
        .bind(genres)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = rows.first().map_or(0, |row| row.0);
        let movies = rows
            .into_iter()
            .map(|(_, id, created_at, title, year, runtime, genres, version)| {
                movie_from_row((id, created_at, title, year, runtime, genres, version))
            })
            .collect();

        Ok((
            movies,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }
}
