//! Request extractors.

use axum::extract::FromRequest;

use crate::error::AppError;

/// Upper bound on request bodies.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// `Json` whose rejections render as [`AppError::BadRequest`].
///
/// Input structs opt into `#[serde(deny_unknown_fields)]`; trailing data after
/// the first JSON value is rejected by the underlying extractor.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
