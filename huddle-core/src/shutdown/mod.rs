//! Graceful shutdown coordinator

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// Broadcasts a single shutdown notice to every subscriber and bounds how
/// long in-flight work may take to drain
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Future that resolves once shutdown begins
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Begin shutdown. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return;
        }
        *state = ShutdownState::ShuttingDown;
        drop(state);

        info!(timeout = ?self.timeout, "Initiating graceful shutdown");
        // no subscribers is fine
        let _ = self.shutdown_tx.send(());
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await == ShutdownState::ShuttingDown
    }

    /// Wait for `work` to finish, giving up after the drain timeout
    pub async fn drain<F: Future>(&self, work: F) -> Option<F::Output> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(output) => Some(output),
            Err(_) => {
                warn!(timeout = ?self.timeout, "drain timed out");
                None
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
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
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
