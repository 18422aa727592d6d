//! Tracked fire-and-forget background work.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Background work that outlives the request that started it.
///
/// Failures and panics are logged and never reach the caller. Shutdown
/// waits for everything spawned here through [`BackgroundTasks::drain`].
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached. It stays counted in [`outstanding`](Self::outstanding)
    /// until it finishes, however it finishes.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "Background task finished"),
                Ok(Err(e)) => error!(task = name, error = %e, "Background task failed"),
                Err(payload) => error!(
                    task = name,
                    panic = panic_message(payload.as_ref()),
                    "Background task panicked"
                ),
            }
        });
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new work and wait until every task has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_every_task() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..5u64 {
            let done = done.clone();
            tasks.spawn("sleeper", async move {
                tokio::time::sleep(Duration::from_secs(i + 1)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            });
        }
        assert_eq!(tasks.outstanding(), 5);

        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.outstanding(), 0);
    }

    #[tokio::test]
    async fn errors_and_panics_are_contained() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fails", async { Err::<(), _>("smtp unavailable") });
        tasks.spawn("panics", async {
            if true {
                panic!("boom");
            }
            Ok::<_, String>(())
        });
        tasks.drain().await;
        assert_eq!(tasks.outstanding(), 0);
    }
}
