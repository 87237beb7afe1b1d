//! WebSocket connections and their subscriptions.
//!
//! One dispatch task owns the set of live connections. Connection handlers
//! never touch that set directly; they send registrations, unregistrations
//! and snapshots through the manager's queues. Each connection has a bounded
//! outbound queue drained by its own writer task, so a slow client never
//! blocks the dispatch task or another connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hotsearch::{AggregateSnapshot, ApiResponse, FetcherRegistry};
use hotsearch_engine::CacheService;

use crate::responses::{self, Reply};
use crate::AppState;

/// Frames queued per connection before pushes start being dropped
const OUTBOUND_CAPACITY: usize = 32;
const CONTROL_CAPACITY: usize = 256;

/// Subscribe or request this name for every source at once
pub const ALL: &str = "all";
/// Subscribe or request this name for the list of source ids
pub const LIST: &str = "list";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Messages a client may send.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { source: String },
    Unsubscribe,
    Request { source: String },
    Ping,
}

/// Messages the server sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    pub fn response(source: impl Into<String>, reply: Reply) -> Self {
        let error = reply.error();
        Self {
            kind: "response".to_string(),
            source: Some(source.into()),
            data: reply.into_data(),
            error,
        }
    }

    pub fn pong() -> Self {
        Self {
            kind: "pong".to_string(),
            source: None,
            data: Value::String("pong".to_string()),
            error: None,
        }
    }

    pub fn invalid(reason: impl std::fmt::Display) -> Self {
        Self {
            kind: "response".to_string(),
            source: None,
            data: Value::Null,
            error: Some(format!("invalid message: {}", reason)),
        }
    }
}

/// What a connection receives pushes for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Connected but not subscribed to anything
    Default,
    Source(String),
    /// History connections never receive pushes
    History,
}

struct Registration {
    id: u64,
    subscription: Subscription,
    outbound: mpsc::Sender<ServerMessage>,
}

struct Connection {
    subscription: Subscription,
    outbound: mpsc::Sender<ServerMessage>,
}

/// Handle to the dispatch task. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    register: mpsc::Sender<Registration>,
    unregister: mpsc::Sender<u64>,
    broadcast: mpsc::Sender<Arc<AggregateSnapshot>>,
}

impl ConnectionManager {
    /// Spawn the dispatch task. It runs until `shutdown` is cancelled.
    pub fn start(
        registry: Arc<FetcherRegistry>,
        active: prometheus::IntGauge,
        shutdown: CancellationToken,
    ) -> Self {
        let (register, register_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (unregister, unregister_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (broadcast, broadcast_rx) = mpsc::channel(CONTROL_CAPACITY);

        let dispatcher = Dispatcher {
            connections: HashMap::new(),
            registry,
            active,
        };
        tokio::spawn(dispatcher.run(register_rx, unregister_rx, broadcast_rx, shutdown));

        Self {
            register,
            unregister,
            broadcast,
        }
    }

    /// Add a connection, or replace the subscription of an existing one.
    pub async fn register(
        &self,
        id: u64,
        subscription: Subscription,
        outbound: mpsc::Sender<ServerMessage>,
    ) {
        let registration = Registration {
            id,
            subscription,
            outbound,
        };
        if self.register.send(registration).await.is_err() {
            debug!(connection = id, "dispatch stopped, registration dropped");
        }
    }

    pub async fn unregister(&self, id: u64) {
        if self.unregister.send(id).await.is_err() {
            debug!(connection = id, "dispatch stopped, unregistration dropped");
        }
    }

    /// Queue a snapshot for delivery to matching subscribers.
    pub async fn broadcast(&self, snapshot: Arc<AggregateSnapshot>) {
        if self.broadcast.send(snapshot).await.is_err() {
            debug!("dispatch stopped, snapshot dropped");
        }
    }
}

struct Dispatcher {
    connections: HashMap<u64, Connection>,
    registry: Arc<FetcherRegistry>,
    active: prometheus::IntGauge,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut register_rx: mpsc::Receiver<Registration>,
        mut unregister_rx: mpsc::Receiver<u64>,
        mut broadcast_rx: mpsc::Receiver<Arc<AggregateSnapshot>>,
        shutdown: CancellationToken,
    ) {
        loop {
            // Registrations before unregistrations before pushes, so a
            // connection's own requests are applied in the order it sent them
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(connections = self.connections.len(), "connection dispatch stopping");
                    break;
                }
                Some(reg) = register_rx.recv() => {
                    let connection = Connection {
                        subscription: reg.subscription,
                        outbound: reg.outbound,
                    };
                    if self.connections.insert(reg.id, connection).is_none() {
                        debug!(connection = reg.id, "connection registered");
                    }
                }
                Some(id) = unregister_rx.recv() => {
                    if self.connections.remove(&id).is_some() {
                        debug!(connection = id, "connection unregistered");
                    }
                }
                Some(snapshot) = broadcast_rx.recv() => self.deliver(&snapshot),
                else => break,
            }
            self.active.set(self.connections.len() as i64);
        }
        self.connections.clear();
        self.active.set(0);
    }

    fn deliver(&mut self, snapshot: &AggregateSnapshot) {
        let mut closed = Vec::new();
        let mut sent = 0usize;

        for (id, conn) in &self.connections {
            let Some(message) = push_for(&conn.subscription, snapshot, &self.registry) else {
                continue;
            };
            match conn.outbound.try_send(message) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection = id, "outbound queue full, push dropped")
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            self.connections.remove(&id);
        }
        debug!(sent, partition = %snapshot.partition, "snapshot pushed");
    }
}

/// The push frame a subscription gets for a snapshot, if any.
fn push_for(
    subscription: &Subscription,
    snapshot: &AggregateSnapshot,
    registry: &FetcherRegistry,
) -> Option<ServerMessage> {
    let Subscription::Source(name) = subscription else {
        return None;
    };
    if name == ALL {
        let items: std::collections::BTreeMap<_, _> = snapshot.items.clone().into_iter().collect();
        let reply = Reply {
            status: axum::http::StatusCode::OK,
            body: ApiResponse::ok(serde_json::to_value(items).ok()?),
        };
        return Some(ServerMessage::response(ALL, reply));
    }

    let descriptor = registry.get(name)?;
    let items = snapshot.items.get(&descriptor.id)?;
    let mut body = ApiResponse::ok(serde_json::to_value(items).ok()?).with_message(name.clone());
    body.icon = (!descriptor.icon.is_empty()).then(|| descriptor.icon.clone());
    let reply = Reply {
        status: axum::http::StatusCode::OK,
        body,
    };
    Some(ServerMessage::response(name.clone(), reply))
}

/// Answer a subscribe or request for `source`.
async fn answer(service: &CacheService, source: &str) -> ServerMessage {
    let reply = match source {
        ALL => responses::all_sources(service).await,
        LIST => responses::source_ids(service),
        id => responses::source(service, id).await,
    };
    ServerMessage::response(source, reply)
}

/// How a connection behaves after it is accepted.
enum Mode {
    /// Full subscribe/unsubscribe/request/ping protocol
    Interactive,
    /// Bound to one source at connect time; only answers ping afterwards
    Pinned(String),
    /// One history answer at connect time; only answers ping afterwards
    History {
        source: String,
        date: Option<String>,
        hour: Option<String>,
    },
}

pub async fn interactive(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state, Mode::Interactive))
}

pub async fn pinned(
    ws: WebSocketUpgrade,
    Path(source): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state, Mode::Pinned(source)))
}

pub async fn history_source(
    ws: WebSocketUpgrade,
    Path(source): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mode = Mode::History {
        source,
        date: None,
        hour: None,
    };
    ws.on_upgrade(|socket| run_connection(socket, state, mode))
}

pub async fn history_date(
    ws: WebSocketUpgrade,
    Path((source, date)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mode = Mode::History {
        source,
        date: Some(date),
        hour: None,
    };
    ws.on_upgrade(|socket| run_connection(socket, state, mode))
}

pub async fn history_hour(
    ws: WebSocketUpgrade,
    Path((source, date, hour)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mode = Mode::History {
        source,
        date: Some(date),
        hour: Some(hour),
    };
    ws.on_upgrade(|socket| run_connection(socket, state, mode))
}

async fn history_answer(
    service: &CacheService,
    source: &str,
    date: Option<&str>,
    hour: Option<&str>,
) -> ServerMessage {
    let (label, reply) = match (date, hour) {
        (Some(date), Some(hour)) => (
            format!("history_{}_{}_{}", source, date, hour),
            responses::history_at(service, source, date, hour).await,
        ),
        (Some(date), None) => (
            format!("history_{}_{}", source, date),
            responses::history_on(service, source, date).await,
        ),
        _ => (
            format!("history_{}", source),
            responses::history_all(service, source).await,
        ),
    };
    ServerMessage::response(label, reply)
}

async fn run_connection(socket: WebSocket, state: Arc<AppState>, mode: Mode) {
    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(write_loop(id, sink, rx));

    // A pinned connection only joins its source once the greeting is queued,
    // so no push can overtake it
    let initial = match &mode {
        Mode::History { .. } => Subscription::History,
        _ => Subscription::Default,
    };
    state.connections.register(id, initial, tx.clone()).await;
    info!(connection = id, "websocket connected");

    let mut open = match &mode {
        Mode::Interactive => true,
        Mode::Pinned(source) => {
            let sent = tx.send(answer(&state.service, source).await).await.is_ok();
            state
                .connections
                .register(id, Subscription::Source(source.clone()), tx.clone())
                .await;
            sent
        }
        Mode::History { source, date, hour } => {
            let message =
                history_answer(&state.service, source, date.as_deref(), hour.as_deref()).await;
            tx.send(message).await.is_ok()
        }
    };

    while open {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(_))) => {
                let reply = ServerMessage::invalid("binary frames are not supported");
                open = tx.send(reply).await.is_ok();
                continue;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(connection = id, error = %e, "websocket read failed");
                break;
            }
        };

        // The reply is queued before any subscription change takes effect
        let (reply, resubscribe) = match serde_json::from_str::<ClientMessage>(&text) {
            Err(e) => (Some(ServerMessage::invalid(e)), None),
            Ok(ClientMessage::Ping) => (Some(ServerMessage::pong()), None),
            Ok(_) if !matches!(mode, Mode::Interactive) => (None, None),
            Ok(ClientMessage::Subscribe { source }) => (
                Some(answer(&state.service, &source).await),
                Some(Subscription::Source(source)),
            ),
            Ok(ClientMessage::Unsubscribe) => (None, Some(Subscription::Default)),
            Ok(ClientMessage::Request { source }) => {
                (Some(answer(&state.service, &source).await), None)
            }
        };

        if let Some(message) = reply {
            open = tx.send(message).await.is_ok();
        }
        if let Some(subscription) = resubscribe {
            state.connections.register(id, subscription, tx.clone()).await;
        }
    }

    state.connections.unregister(id).await;
    info!(connection = id, "websocket disconnected");
}

/// Drain the outbound queue onto the socket. Ends on the first failed write
/// or once every sender is gone.
async fn write_loop(
    id: u64,
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(connection = id, error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(connection = id, error = %e, "websocket write failed");
            break;
        }
    }
    rx.close();
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hotsearch::test_helpers::{records, MockFetcher};
    use hotsearch::{Partition, SourceItems};

    fn registry() -> Arc<FetcherRegistry> {
        let mut registry = FetcherRegistry::new();
        registry
            .register("quark", "Quark", "https://quark/icon", Arc::new(MockFetcher::succeeding("quark", 1)))
            .unwrap();
        registry
            .register("weibo", "Weibo", "", Arc::new(MockFetcher::succeeding("weibo", 1)))
            .unwrap();
        registry.alias("kuake", "quark").unwrap();
        Arc::new(registry)
    }

    fn snapshot() -> Arc<AggregateSnapshot> {
        let mut items = SourceItems::new();
        items.insert("quark".to_string(), records("quark", 2));
        Arc::new(AggregateSnapshot {
            items,
            created_at: Utc::now(),
            partition: Partition::current(),
        })
    }

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","source":"baidu"}"#)
                .unwrap(),
            ClientMessage::Subscribe {
                source: "baidu".to_string()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let pong = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(pong, serde_json::json!({"type": "pong", "data": "pong"}));

        let invalid = serde_json::to_value(ServerMessage::invalid("eof")).unwrap();
        assert_eq!(
            invalid,
            serde_json::json!({"type": "response", "error": "invalid message: eof"})
        );
    }

    #[test]
    fn test_push_matches_subscription() {
        let registry = registry();
        let snapshot = snapshot();

        let push = push_for(&Subscription::Source("kuake".into()), &snapshot, &registry).unwrap();
        assert_eq!(push.source.as_deref(), Some("kuake"));
        assert_eq!(push.data["obj"].as_array().unwrap().len(), 2);
        assert_eq!(push.data["icon"], "https://quark/icon");

        let all = push_for(&Subscription::Source(ALL.into()), &snapshot, &registry).unwrap();
        assert_eq!(all.data["obj"]["quark"].as_array().unwrap().len(), 2);

        assert!(push_for(&Subscription::Source("weibo".into()), &snapshot, &registry).is_none());
        assert!(push_for(&Subscription::Default, &snapshot, &registry).is_none());
        assert!(push_for(&Subscription::History, &snapshot, &registry).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers_only() {
        let gauge = prometheus::IntGauge::new("test_ws_connections", "test").unwrap();
        let shutdown = CancellationToken::new();
        let manager = ConnectionManager::start(registry(), gauge.clone(), shutdown.clone());

        let (sub_tx, mut sub_rx) = mpsc::channel(4);
        let (idle_tx, mut idle_rx) = mpsc::channel(4);
        manager
            .register(1, Subscription::Source("quark".into()), sub_tx)
            .await;
        manager.register(2, Subscription::Default, idle_tx).await;
        manager.broadcast(snapshot()).await;

        let pushed = sub_rx.recv().await.unwrap();
        assert_eq!(pushed.kind, "response");
        assert_eq!(pushed.source.as_deref(), Some("quark"));
        assert!(idle_rx.try_recv().is_err());

        manager.unregister(1).await;
        manager.broadcast(snapshot()).await;
        // Dispatch dropped its sender for connection 1
        assert!(sub_rx.recv().await.is_none());

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while gauge.get() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("gauge never settled at one connection");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_closed_outbound_queue_is_dropped_on_broadcast() {
        let gauge = prometheus::IntGauge::new("test_ws_closed", "test").unwrap();
        let shutdown = CancellationToken::new();
        let manager = ConnectionManager::start(registry(), gauge.clone(), shutdown.clone());

        let (gone_tx, gone_rx) = mpsc::channel(4);
        let (live_tx, mut live_rx) = mpsc::channel(4);
        manager
            .register(1, Subscription::Source("quark".into()), gone_tx)
            .await;
        manager
            .register(2, Subscription::Source(ALL.into()), live_tx)
            .await;
        drop(gone_rx);

        manager.broadcast(snapshot()).await;
        assert_eq!(live_rx.recv().await.unwrap().source.as_deref(), Some(ALL));

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while gauge.get() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("closed connection was never dropped");

        shutdown.cancel();
    }
}
