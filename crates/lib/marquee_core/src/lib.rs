//! # marquee_core
//!
//! Core domain logic for Marquee: credentials, permissions, persistence
//! ports, rate limiting and process lifecycle.

pub mod auth;
pub mod clock;
pub mod mailer;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod shutdown;
pub mod store;
pub mod tasks;
pub mod validation;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
