//! Graceful shutdown sequencing.
//!
//! On a termination signal the listener stops accepting connections, in-flight
//! requests finish, then outstanding background tasks drain. Both steps share
//! one deadline.

use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::tasks::BackgroundTasks;

/// Time allowed for listener close plus task drain.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    ShutdownRequested,
    Draining,
    /// Terminal.
    Stopped,
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown deadline exceeded with {outstanding} background task(s) outstanding")]
    DeadlineExceeded { outstanding: usize },

    #[error("server error: {0}")]
    Server(#[from] io::Error),
}

pub struct ShutdownCoordinator {
    phase: watch::Sender<ShutdownPhase>,
    listener: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            phase,
            listener: CancellationToken::new(),
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Fires when the server should stop accepting connections. Hand it to
    /// `with_graceful_shutdown`.
    pub fn listener_token(&self) -> CancellationToken {
        self.listener.clone()
    }

    fn enter(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!(?phase, "Shutdown phase");
    }

    /// Drive the server until `signal` resolves, then shut down in order.
    ///
    /// Ends in [`ShutdownPhase::Stopped`] whatever the outcome.
    pub async fn run<S, F>(
        &self,
        signal: S,
        server: F,
        tasks: &BackgroundTasks,
    ) -> Result<(), ShutdownError>
    where
        S: Future<Output = ()>,
        F: Future<Output = io::Result<()>>,
    {
        let result = self.sequence(signal, server, tasks).await;
        if let Err(e) = &result {
            error!(error = %e, "Shutdown did not complete cleanly");
        }
        self.enter(ShutdownPhase::Stopped);
        result
    }

    async fn sequence<S, F>(
        &self,
        signal: S,
        server: F,
        tasks: &BackgroundTasks,
    ) -> Result<(), ShutdownError>
    where
        S: Future<Output = ()>,
        F: Future<Output = io::Result<()>>,
    {
        tokio::pin!(server);

        let exited = tokio::select! {
            res = &mut server => Some(res),
            () = signal => None,
        };

        self.enter(ShutdownPhase::ShutdownRequested);
        self.listener.cancel();
        let deadline = Instant::now() + SHUTDOWN_DEADLINE;
        let exceeded = |_| ShutdownError::DeadlineExceeded {
            outstanding: tasks.outstanding(),
        };

        match exited {
            Some(res) => res?,
            None => timeout_at(deadline, &mut server).await.map_err(exceeded)??,
        }

        self.enter(ShutdownPhase::Draining);
        info!(outstanding = tasks.outstanding(), "Waiting for background tasks");
        timeout_at(deadline, tasks.drain()).await.map_err(exceeded)?;
        Ok(())
    }
}
