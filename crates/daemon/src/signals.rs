//! Graceful shutdown signal handling for the mirror daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Shared shutdown flag checked by the polling loop.
pub type ShutdownFlag = Arc<AtomicBool>;

/// Create a new shutdown flag and register OS signal handlers.
///
/// On SIGTERM or SIGINT (Ctrl+C), the flag is set to `true`. Must be called
/// from within a tokio runtime.
pub fn setup_signal_handlers() -> ShutdownFlag {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_clone = flag.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        flag_clone.store(true, Ordering::SeqCst);
    });

    flag
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM; only Ctrl+C will stop the daemon");
            if ctrl_c.await.is_ok() {
                info!("received SIGINT (Ctrl+C), initiating shutdown");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, initiating shutdown"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Check whether the shutdown flag has been set.
pub fn is_shutdown_requested(flag: &ShutdownFlag) -> bool {
    flag.load(Ordering::SeqCst)
}
