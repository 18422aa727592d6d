//! Authentication middleware: Bearer token resolution and the access guards
//! that routes opt into.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum::http::header::AUTHORIZATION;
use marquee_core::auth::access::{self, Identity};
use marquee_core::auth::permissions::PermissionChecker;
use marquee_core::auth::tokens::TokenScope;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Resolve the caller from `Authorization: Bearer <token>`.
///
/// A missing header is not an error; the request continues as
/// [`Identity::Anonymous`].
async fn resolve_identity(
    state: &AppState,
    authorization: Option<HeaderValue>,
) -> Result<Identity, AppError> {
    let Some(value) = authorization else {
        return Ok(Identity::Anonymous);
    };
    let header = value
        .to_str()
        .map_err(|_| AppError::InvalidCredentialFormat)?;

    let token = match header.split(' ').collect::<Vec<_>>().as_slice() {
        ["Bearer", token] => *token,
        _ => return Err(AppError::InvalidCredentialFormat),
    };

    let user = state
        .tokens
        .resolve(TokenScope::Authentication, token)
        .await?;
    debug!(user_id = user.id, "Authenticated request");
    Ok(Identity::User(user))
}

/// Axum middleware: resolves the caller once and stores the [`Identity`] in
/// request extensions. Every response varies on `Authorization`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request.headers().get(AUTHORIZATION).cloned();
    let mut response = match resolve_identity(&state, authorization).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

fn identity(request: &Request) -> &Identity {
    const ANONYMOUS: &Identity = &Identity::Anonymous;
    request.extensions().get::<Identity>().unwrap_or(ANONYMOUS)
}

/// Rejects anonymous callers.
pub async fn require_authenticated(request: Request, next: Next) -> Result<Response, AppError> {
    access::require_authenticated(identity(&request))?;
    Ok(next.run(request).await)
}

/// Rejects anonymous callers and inactive accounts.
pub async fn require_activated(request: Request, next: Next) -> Result<Response, AppError> {
    access::require_activated(identity(&request))?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the checker and the code a route needs.
#[derive(Clone)]
pub struct PermissionGate {
    checker: PermissionChecker,
    code: &'static str,
}

impl PermissionGate {
    pub fn new(checker: PermissionChecker, code: &'static str) -> Self {
        Self { checker, code }
    }
}

/// Rejects callers that are anonymous, inactive, or lack the gate's
/// permission, in that order.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    gate.checker.authorize(identity(&request), gate.code).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::{Extension, Router};
    use chrono::Utc;
    use marquee_core::models::user::User;
    use tower::ServiceExt;

    use super::*;

    fn user(activated: bool) -> Identity {
        Identity::User(User {
            id: 9,
            created_at: Utc::now(),
            name: "Bob".into(),
            email: "bob@example.com".into(),
            password_hash: String::new(),
            activated,
            version: 1,
        })
    }

    async fn status(app: Router) -> StatusCode {
        app.oneshot(
            axum::http::Request::builder()
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
            .await
            .unwrap()
            .status()
    }

    fn authenticated_only(identity: Identity) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(from_fn(require_authenticated))
            .layer(Extension(identity))
    }

    fn activated_only(identity: Identity) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(from_fn(require_activated))
            .layer(Extension(identity))
    }

    #[tokio::test]
    async fn authenticated_guard() {
        assert_eq!(
            status(authenticated_only(Identity::Anonymous)).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(authenticated_only(user(false))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn activated_guard() {
        assert_eq!(
            status(activated_only(Identity::Anonymous)).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(activated_only(user(false))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(activated_only(user(true))).await, StatusCode::OK);
    }

    fn assert_send<T: Send>(_: &T) {}

    fn state() -> AppState {
        AppState::new(
            crate::config::ApiConfig::default(),
            marquee_core::store::Stores::in_memory(),
            std::sync::Arc::new(marquee_core::mailer::LogMailer),
            std::sync::Arc::new(marquee_core::clock::SystemClock),
        )
        .unwrap()
    }

    #[test]
    fn identity_resolution_is_send() {
        let state = state();
        let header = Some(HeaderValue::from_static("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert_send(&resolve_identity(&state, header));
    }

    #[tokio::test]
    async fn authenticate_layers_onto_a_router() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state(), authenticate));
        assert_eq!(status(app).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_header_is_rejected_with_vary() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state(), authenticate));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "Token abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::VARY], "Authorization");
    }

    #[tokio::test]
    async fn missing_identity_counts_as_anonymous() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(from_fn(require_authenticated));
        assert_eq!(status(app).await, StatusCode::UNAUTHORIZED);
    }
}
