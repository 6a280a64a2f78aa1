//! Graceful shutdown (spec §4.8, C9): a `ctrl_c`-triggered `Notify` that
//! `main` hands to `axum::serve`'s `with_graceful_shutdown` and to each
//! per-market matcher/sweeper task, so in-flight command-queue drains finish
//! before the process exits (ground: teacher's `tracing::info!` shutdown
//! logging style in `main.rs`; the signal plumbing itself is standard
//! `tokio::signal` + `tokio::sync::Notify` since the teacher's own `main.rs`
//! has no shutdown handling to imitate).

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

/// Cloneable shutdown handle. `notified()` resolves once `trigger()` has been
/// called (or immediately, on every subsequent call).
#[derive(Clone)]
pub struct Shutdown {
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn trigger(&self) {
        self.notify.notify_waiters();
    }

    /// The underlying `Notify`, for callers (the sweeper tasks) that take
    /// `Arc<Notify>` directly rather than this wrapper.
    pub fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Waits for Ctrl+C (or SIGTERM on unix), then triggers shutdown. Intended
    /// to be spawned once and awaited by `axum::serve(..).with_graceful_shutdown(...)`.
    pub async fn signal(self) {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
        }

        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
