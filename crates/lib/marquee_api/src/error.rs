//! Application error types.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use marquee_core::auth::AuthError;
use marquee_core::auth::access::AccessDenied;
use marquee_core::auth::permissions::AuthorizeError;
use marquee_core::store::StoreError;
use marquee_core::validation::FieldErrors;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("one or more fields failed validation")]
    FailedValidation(FieldErrors),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid or missing authentication token")]
    InvalidCredentialFormat,

    #[error("invalid or missing authentication token")]
    CredentialNotRecognized,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    AccountNotActivated,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// The detail is logged, never returned.
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl AppError {
    /// A single-field validation failure.
    pub fn field(key: &str, message: &str) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(key.to_string(), message.to_string());
        Self::FailedValidation(fields)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidCredentials
            | Self::InvalidCredentialFormat
            | Self::CredentialNotRecognized
            | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AccountNotActivated | Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::FailedValidation(_) => "failed_validation",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidCredentialFormat | Self::CredentialNotRecognized => {
                "invalid_authentication_token"
            }
            Self::AuthenticationRequired => "authentication_required",
            Self::AccountNotActivated => "inactive_account",
            Self::PermissionDenied => "not_permitted",
            Self::RateLimited => "rate_limit_exceeded",
            Self::EditConflict => "edit_conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Internal(detail) => {
                error!(error = %detail, "Internal server error");
                "the server encountered a problem and could not process your request".to_string()
            }
            AppError::RateLimited => {
                debug!("Rate limit exceeded");
                self.to_string()
            }
            _ => self.to_string(),
        };
        let fields = match &self {
            AppError::FailedValidation(fields) => Some(fields),
            _ => None,
        };
        let body = Json(ErrorBody {
            error: self.code(),
            message,
            fields,
        });
        let mut response = (self.status(), body).into_response();
        if matches!(
            self,
            AppError::InvalidCredentialFormat | AppError::CredentialNotRecognized
        ) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<FieldErrors> for AppError {
    fn from(fields: FieldErrors) -> Self {
        AppError::FailedValidation(fields)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::DuplicateEmail => {
                AppError::field("email", "a user with this email address already exists")
            }
            StoreError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentialFormat => AppError::InvalidCredentialFormat,
            AuthError::CredentialNotRecognized => AppError::CredentialNotRecognized,
            AuthError::Hash(msg) => AppError::Internal(msg),
            AuthError::Store(e) => AppError::from(e),
        }
    }
}

impl From<AccessDenied> for AppError {
    fn from(e: AccessDenied) -> Self {
        match e {
            AccessDenied::AuthenticationRequired => AppError::AuthenticationRequired,
            AccessDenied::AccountNotActivated => AppError::AccountNotActivated,
            AccessDenied::PermissionDenied => AppError::PermissionDenied,
        }
    }
}

impl From<AuthorizeError> for AppError {
    fn from(e: AuthorizeError) -> Self {
        match e {
            AuthorizeError::Denied(denied) => AppError::from(denied),
            AuthorizeError::Store(e) => AppError::from(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task: {e}"))
    }
}
