//! Token issuance handlers.

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
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

/// `POST /v1/tokens/authentication`: log in.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let token = accounts::login(&state, &body.email, body.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

/// `POST /v1/tokens/activation`: resend an activation token.
pub async fn create_activation_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    accounts::resend_activation(&state, &body.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions",
        })),
    ))
}

/// `POST /v1/tokens/password-reset`: mail a password-reset token.
pub async fn create_password_reset_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    accounts::request_password_reset(&state, &body.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing password reset instructions",
        })),
    ))
}
