//! Movie catalogue handlers.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use marquee_core::models::filters::Filters;
use marquee_core::models::movie::{NewMovie, Runtime, validate_movie};
use marquee_core::validation::Validator;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::JsonBody;
use crate::routes;

/// Optimistic-locking precondition on updates.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

/// Movie ids are positive integers; anything else cannot name a movie.
fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(AppError::NotFound)
}

fn query_int(query: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match query.get(key).filter(|s| !s.is_empty()) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

/// `GET /v1/movies`: filter by `title` and comma-separated `genres`, with
/// `page`, `page_size` and `sort`.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let title = query.get("title").map(String::as_str).unwrap_or_default();
    let genres: Vec<String> = query
        .get("genres")
        .filter(|s| !s.is_empty())
        .map(|csv| csv.split(',').map(str::to_owned).collect())
        .unwrap_or_default();

    let defaults = Filters::default();
    let filters = Filters {
        page: query_int(&query, "page", defaults.page, &mut v),
        page_size: query_int(&query, "page_size", defaults.page_size, &mut v),
        sort: query
            .get("sort")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or(defaults.sort),
    };
    filters.validate(&mut v);
    v.finish()?;

    let (movies, metadata) = state.stores.movies.list(title, &genres, &filters).await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

/// `POST /v1/movies`
pub async fn create(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateMovieRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<Value>)> {
    let mut v = Validator::new();
    validate_movie(&mut v, &body.title, body.year, body.runtime, &body.genres);
    v.finish()?;

    let movie = state
        .stores
        .movies
        .insert(NewMovie {
            title: body.title,
            year: body.year,
            runtime: body.runtime,
            genres: body.genres,
        })
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = routes::movie_location(movie.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    info!(movie_id = movie.id, "Created movie");
    Ok((StatusCode::CREATED, headers, Json(json!({ "movie": movie }))))
}

/// `GET /v1/movies/{id}`
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let movie = state.stores.movies.get(parse_id(&id)?).await?;
    Ok(Json(json!({ "movie": movie })))
}

/// `PATCH /v1/movies/{id}`: honours `X-Expected-Version` when present.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<UpdateMovieRequest>,
) -> AppResult<Json<Value>> {
    let mut movie = state.stores.movies.get(parse_id(&id)?).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let expected: i32 = expected
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| AppError::BadRequest("X-Expected-Version must be an integer".into()))?;
        if expected != movie.version {
            return Err(AppError::EditConflict);
        }
    }

    if let Some(title) = body.title {
        movie.title = title;
    }
    if let Some(year) = body.year {
        movie.year = year;
    }
    if let Some(runtime) = body.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = body.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie.title, movie.year, movie.runtime, &movie.genres);
    v.finish()?;

    state.stores.movies.update(&mut movie).await?;
    info!(movie_id = movie.id, version = movie.version, "Updated movie");
    Ok(Json(json!({ "movie": movie })))
}

/// `DELETE /v1/movies/{id}`
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    state.stores.movies.delete(parse_id(&id)?).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}
