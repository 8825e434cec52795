//! OS termination signals
//!
//! Every registered session gets its own watcher task. On SIGINT or SIGTERM
//! the watcher stops its session through the registry and exits; it also
//! exits quietly once its session stops for any other reason.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use pt_core::SessionKey;

use crate::registry::SessionRegistry;
use crate::stop::StopHandle;

/// Produces the future a watcher waits on
pub type SignalSource = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Signal source waiting for SIGINT/SIGTERM (Ctrl+C elsewhere)
pub fn os_signals() -> SignalSource {
    Arc::new(|| Box::pin(shutdown_signal()))
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::debug!("Received SIGTERM");
        }
    }
}

/// Watches for termination signals on behalf of one session
pub struct SignalWatcher;

impl SignalWatcher {
    /// Attach a watcher resolving on `signal`
    pub fn attach_with<F>(
        registry: Arc<SessionRegistry>,
        key: SessionKey,
        stop: StopHandle,
        signal: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    tracing::trace!("Signal watcher for {} done", key);
                }
                _ = signal => {
                    tracing::info!("Termination signal received, stopping {}", key);
                    registry.stop_if_current(&key, &stop);
                }
            }
        })
    }
}
