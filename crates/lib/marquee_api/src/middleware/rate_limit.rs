//! Per-client rate limiting.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

/// Client key for rate limiting: the first `X-Forwarded-For` entry, else
/// `X-Real-IP`, else the peer address. Proxy headers are only consulted when
/// `trust_proxy_headers` is set.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    let peer_ip = || peer.map(|addr| addr.ip().to_string());
    if !trust_proxy_headers {
        return peer_ip().unwrap_or_else(|| "unknown".to_owned());
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_owned)
        .or_else(peer_ip)
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Axum middleware: admits or rejects the request against the caller's
/// bucket.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.limiter.is_enabled() {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = client_ip(
            request.headers(),
            peer,
            state.config.trust_proxy_headers,
        );
        if !state.limiter.admit(&client) {
            return Err(AppError::RateLimited);
        }
    }
    Ok(next.run(request).await)
}
