pub mod api;
pub mod responses;
pub mod shutdown;
pub mod ws;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hotsearch_engine::{CacheService, Engine, Refresher};

use crate::ws::ConnectionManager;

/// Metrics for prometheus
pub struct Metrics {
    pub registry: prometheus::Registry,
    pub http_requests: prometheus::IntCounterVec,
    pub ws_connections: prometheus::IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = prometheus::Registry::new();

        let http_requests = prometheus::IntCounterVec::new(
            prometheus::Opts::new("hotsearch_http_requests_total", "HTTP requests by route"),
            &["route", "status"],
        )
        .unwrap();
        let ws_connections = prometheus::IntGauge::new(
            "hotsearch_ws_connections",
            "Active WebSocket connections",
        )
        .unwrap();

        registry.register(Box::new(http_requests.clone())).unwrap();
        registry.register(Box::new(ws_connections.clone())).unwrap();

        Self {
            registry,
            http_requests,
            ws_connections,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state
pub struct AppState {
    pub service: Arc<CacheService>,
    pub refresher: Arc<Refresher>,
    pub connections: ConnectionManager,
    pub metrics: Arc<Metrics>,
    pub shutting_down: AtomicBool,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the server around an engine. Starts the connection dispatch
    /// task, so this must run inside a tokio runtime.
    pub fn new(engine: &Engine, metrics: Arc<Metrics>) -> Self {
        let shutdown = CancellationToken::new();
        let connections = ConnectionManager::start(
            Arc::clone(engine.service.registry()),
            metrics.ws_connections.clone(),
            shutdown.child_token(),
        );
        Self {
            service: Arc::clone(&engine.service),
            refresher: Arc::clone(&engine.refresher),
            connections,
            metrics,
            shutting_down: AtomicBool::new(false),
            shutdown,
        }
    }
}

/// Forward every completed refresh to WebSocket subscribers until shutdown.
pub async fn forward_refreshes(state: Arc<AppState>) {
    let mut updates = state.refresher.subscribe();
    info!("push updates enabled");

    loop {
        let snapshot = tokio::select! {
            () = state.shutdown.cancelled() => break,
            received = updates.recv() => match received {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push forwarder lagged behind refresher");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        state.connections.broadcast(snapshot).await;
    }
}
