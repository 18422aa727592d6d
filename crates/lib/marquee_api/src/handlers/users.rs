//! User account handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::JsonBody;
use crate::services::accounts;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

/// `POST /v1/users/register`: register a new, inactive account.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = accounts::register(&state, body.name, body.email, body.password).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions",
            "user": user,
        })),
    ))
}

/// `PUT /v1/users/activated`: activate an account with its token.
pub async fn activate(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ActivateRequest>,
) -> AppResult<Json<Value>> {
    let user = accounts::activate(&state, &body.token).await?;
    Ok(Json(json!({ "user": user })))
}

/// `PUT /v1/users/password`: set a new password with a reset token.
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    accounts::reset_password(&state, body.password, &body.token).await?;
    Ok(Json(
        json!({ "message": "your password was successfully reset" }),
    ))
}
