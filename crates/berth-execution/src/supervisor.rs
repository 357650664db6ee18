//! Ownership of background tasks and shutdown flushing.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use berth_infrastructure::storage::Flushable;

/// Owns every background loop of the process.
///
/// Tasks observe the supervisor's cancellation token. `shutdown` cancels it,
/// waits up to the grace period for the tasks to stop, and then flushes every
/// registered store.
pub struct Supervisor {
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    flush_hooks: Mutex<Vec<Arc<dyn Flushable>>>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            flush_hooks: Mutex::new(Vec::new()),
            grace,
        }
    }

    /// Token cancelled on shutdown; hand child tokens to long-running loops.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a named background task onto the current runtime.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(task = %name, "[Supervisor] Spawning task");
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.spawn(async move {
            task.await;
            tracing::debug!(task = %name, "[Supervisor] Task finished");
        });
    }

    pub fn register_flush(&self, store: Arc<dyn Flushable>) {
        self.flush_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(store);
    }

    /// Flushes every registered store. Failures are logged; the number of
    /// failed stores is returned.
    pub fn flush_all(&self) -> usize {
        let hooks = self
            .flush_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for hook in hooks {
            match hook.flush() {
                Ok(()) => tracing::debug!(key = hook.key(), "[Supervisor] Flushed"),
                Err(e) => {
                    failures += 1;
                    tracing::error!(key = hook.key(), error = %e, "[Supervisor] Final flush failed");
                }
            }
        }
        failures
    }

    pub async fn shutdown(&self) {
        tracing::info!("[Supervisor] Shutting down");
        self.token.cancel();

        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "[Supervisor] Task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                grace = ?self.grace,
                "[Supervisor] Tasks still running after grace period, aborting"
            );
            tasks.abort_all();
        }

        self.flush_all();
        tracing::info!("[Supervisor] Shutdown complete");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "[Supervisor] Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "[Supervisor] Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("[Supervisor] Ctrl-C received"),
        _ = terminate => tracing::info!("[Supervisor] SIGTERM received"),
    }
}
