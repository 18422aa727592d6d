//! Gatekeeper middleware.

pub mod auth;
pub mod metrics;
pub mod panic;
pub mod rate_limit;
