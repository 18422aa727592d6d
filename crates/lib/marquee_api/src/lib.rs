//! # marquee_api
//!
//! HTTP API library for Marquee.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, header};
use axum::middleware::from_fn_with_state;
use axum::routing::{MethodRouter, get, patch, post, put};
use marquee_core::auth::permissions::{
    METRICS_READ, MOVIES_READ, MOVIES_WRITE, PermissionChecker,
};
use marquee_core::auth::tokens::TokenManager;
use marquee_core::clock::Clock;
use marquee_core::mailer::Mailer;
use marquee_core::ratelimit::RateLimiter;
use marquee_core::store::Stores;
use marquee_core::tasks::BackgroundTasks;
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::extract::MAX_BODY_BYTES;
use crate::handlers::{healthcheck, metrics, movies, tokens, users};
use crate::middleware::auth::PermissionGate;
use crate::middleware::metrics::Metrics;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub stores: Stores,
    pub tokens: TokenManager,
    pub permissions: PermissionChecker,
    pub limiter: Arc<RateLimiter>,
    /// Work that outlives a request, such as mail delivery.
    pub tasks: BackgroundTasks,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Fails only if the request counters cannot be registered.
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            tokens: TokenManager::new(stores.tokens.clone(), clock),
            permissions: PermissionChecker::new(stores.permissions.clone()),
            limiter: Arc::new(RateLimiter::new(config.limiter)),
            tasks: BackgroundTasks::new(),
            metrics: Arc::new(Metrics::new()?),
            config,
            stores,
            mailer,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `marquee_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    marquee_core::migrate::migrate(pool).await
}

/// Wrap every method in `route` with a permission check for `code`.
fn guarded(
    route: MethodRouter<AppState>,
    state: &AppState,
    code: &'static str,
) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(
        PermissionGate::new(state.permissions.clone(), code),
        middleware::auth::require_permission,
    ))
}

/// Builds the Axum router with all routes, the gatekeeper chain and shared
/// state.
pub fn router(state: AppState) -> Router {
    let origins = state.config.trusted_origins().unwrap_or_else(|e| {
        warn!("CORS disabled: {e}");
        Vec::new()
    });
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public = Router::new()
        .route(routes::GET_HEALTHCHECK, get(healthcheck::healthcheck))
        .route(routes::POST_USERS_REGISTER, post(users::register))
        .route(routes::PUT_USERS_ACTIVATED, put(users::activate))
        .route(routes::PUT_USERS_PASSWORD, put(users::reset_password))
        .route(
            routes::POST_TOKENS_AUTHENTICATION,
            post(tokens::create_authentication_token),
        )
        .route(
            routes::POST_TOKENS_ACTIVATION,
            post(tokens::create_activation_token),
        )
        .route(
            routes::POST_TOKENS_PASSWORD_RESET,
            post(tokens::create_password_reset_token),
        );

    let protected = Router::new()
        .route(
            routes::MOVIES,
            guarded(get(movies::list), &state, MOVIES_READ)
                .merge(guarded(post(movies::create), &state, MOVIES_WRITE)),
        )
        .route(
            routes::MOVIES_ID,
            guarded(get(movies::show), &state, MOVIES_READ).merge(guarded(
                patch(movies::update).delete(movies::delete),
                &state,
                MOVIES_WRITE,
            )),
        )
        .route(
            routes::GET_DEBUG_VARS,
            guarded(get(metrics::snapshot), &state, METRICS_READ),
        );

    // The last layer added is the outermost.
    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(cors)
        .layer(RequestBodyTimeoutLayer::new(state.config.read_timeout))
        .layer(TimeoutLayer::new(state.config.write_timeout))
        .layer(from_fn_with_state(
            state.metrics.clone(),
            middleware::metrics::track,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::panic::handle_panic))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
