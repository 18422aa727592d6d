//! Request handlers.

pub mod healthcheck;
pub mod metrics;
pub mod movies;
pub mod tokens;
pub mod users;

use axum::http::Method;

use crate::error::AppError;

/// Fallback for unknown paths.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Fallback for known paths hit with an unsupported method.
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method)
}
