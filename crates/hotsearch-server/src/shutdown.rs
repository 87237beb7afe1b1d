use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::info;

use crate::AppState;

/// Wait for SIGTERM or ctrl-c, then stop the background tasks.
///
/// The HTTP server keeps draining in-flight requests after this returns.
pub async fn wait_for_shutdown(state: Arc<AppState>) {
    shutdown_signal().await;
    info!("shutdown signal received");
    begin(&state);
}

/// Flip health to 503, stop the refresher, and stop connection dispatch.
pub fn begin(state: &AppState) {
    state.shutting_down.store(true, Ordering::Relaxed);
    state.refresher.shutdown();
    state.shutdown.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = ctrl_c => info!("ctrl-c received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
}
