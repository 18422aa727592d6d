//! Per-client token-bucket rate limiting.
//!
//! Every client key maps to one bucket in a single mutex-guarded map. The
//! request path and the background sweep take the same lock, and it is never
//! held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Entries not seen for this long are evicted by the sweep.
pub const STALE_AFTER: Duration = Duration::from_secs(3 * 60);

/// How often the sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Sustained requests per second per client.
    pub rps: f64,
    /// Bucket capacity.
    pub burst: u32,
    pub enabled: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LimiterConfigError {
    #[error("limiter rps must be a finite, non-negative number (got {0})")]
    InvalidRps(f64),
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<(), LimiterConfigError> {
        if !self.rps.is_finite() || self.rps < 0.0 {
            return Err(LimiterConfigError::InvalidRps(self.rps));
        }
        Ok(())
    }
}

/// Continuous-refill token bucket.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            refilled_at: now,
        }
    }

    /// Refill for the time elapsed since the last call, then try to take one
    /// token.
    fn try_take(&mut self, rps: f64, burst: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(f64::from(burst));
        self.refilled_at = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Registry of per-client buckets.
pub struct RateLimiter {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, Client>>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject one request from `client`.
    pub fn admit(&self, client: &str) -> bool {
        self.admit_at(client, Instant::now())
    }

    pub fn admit_at(&self, client: &str, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        let LimiterConfig { rps, burst, .. } = self.config;
        let mut clients = self.clients();
        let entry = clients.entry(client.to_owned()).or_insert_with(|| Client {
            bucket: TokenBucket::full(burst, now),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.bucket.try_take(rps, burst, now)
    }

    /// Evict clients idle for longer than [`STALE_AFTER`]. Returns how many
    /// were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= STALE_AFTER);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients().len()
    }

    /// Run the sweep every [`SWEEP_INTERVAL`] until `cancel` fires. Nothing
    /// is spawned when the limiter is disabled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        let limiter = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep_at(Instant::now());
                        if evicted > 0 {
                            debug!(evicted, remaining = limiter.client_count(), "Swept idle rate-limit clients");
                        }
                    }
                }
            }
            info!("Rate-limit sweeper stopped");
        }))
    }
}
