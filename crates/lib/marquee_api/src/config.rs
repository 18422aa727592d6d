//! API server configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use marquee_core::ratelimit::{LimiterConfig, LimiterConfigError};
use serde::Serialize;
use thiserror::Error;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown environment '{0}' (expected development|staging|production)")]
    UnknownEnvironment(String),

    #[error("invalid trusted CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error(transparent)]
    Limiter(#[from] LimiterConfigError),
}

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub env: Environment,
    /// TCP port to listen on.
    pub port: u16,
    pub limiter: LimiterConfig,
    /// Origins allowed to make cross-origin requests. Empty disables CORS.
    pub cors_trusted_origins: Vec<String>,
    /// Reported by the health check and metrics.
    pub version: String,
    /// Key rate-limit buckets on `X-Forwarded-For` / `X-Real-IP` when set;
    /// otherwise on the peer address only.
    pub trust_proxy_headers: bool,
    /// Upper bound on reading a request body.
    pub read_timeout: Duration,
    /// Upper bound on producing a response.
    pub write_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            port: 4000,
            limiter: LimiterConfig::default(),
            cors_trusted_origins: Vec::new(),
            version: marquee_core::version().to_string(),
            trust_proxy_headers: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limiter.validate()?;
        self.trusted_origins().map(|_| ())
    }

    /// Trusted origins as header values.
    pub fn trusted_origins(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.cors_trusted_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
            })
            .collect()
    }
}
