use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use hotsearch_engine::RefreshOutcome;

use crate::{responses, ws, AppState};

/// Build the axum router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/list", get(list_sources))
        .route("/all", get(all_sources))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/admin/refresh", post(refresh_handler))
        .route("/ws", get(ws::interactive))
        .route("/ws/history/:source", get(ws::history_source))
        .route("/ws/history/:source/:date", get(ws::history_date))
        .route("/ws/history/:source/:date/:hour", get(ws::history_hour))
        .route("/ws/:source", get(ws::pinned))
        .route("/history/:source", get(history_source))
        .route("/history/:source/:date", get(history_date))
        .route("/history/:source/:date/:hour", get(history_hour))
        // Catch-all for source ids; static routes above take precedence
        .route("/:source", get(source))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            count_requests,
        ))
        .with_state(state)
}

/// CORS for browser clients. `*` allows any origin; otherwise a
/// comma-separated list of allowed origins.
pub fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Count requests per matched route template, so `/:source` is one series
/// rather than one per id.
async fn count_requests(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    state
        .metrics
        .http_requests
        .with_label_values(&[&route, response.status().as_str()])
        .inc();
    response
}

/// GET /list
async fn list_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    responses::source_list(&state.service)
}

/// GET /all
async fn all_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    responses::all_sources(&state.service).await
}

/// GET /:source
async fn source(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> impl IntoResponse {
    responses::source(&state.service, &source).await
}

/// GET /history/:source
async fn history_source(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> impl IntoResponse {
    responses::history_all(&state.service, &source).await
}

/// GET /history/:source/:date
async fn history_date(
    State(state): State<Arc<AppState>>,
    Path((source, date)): Path<(String, String)>,
) -> impl IntoResponse {
    responses::history_on(&state.service, &source, &date).await
}

/// GET /history/:source/:date/:hour
async fn history_hour(
    State(state): State<Arc<AppState>>,
    Path((source, date, hour)): Path<(String, String, String)>,
) -> impl IntoResponse {
    responses::history_at(&state.service, &source, &date, &hour).await
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutting_down.load(Ordering::Relaxed) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "shutting_down"})),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "sources": state.service.list_ids().len(),
        })),
    )
        .into_response()
}

/// GET /metrics
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = prometheus::TextEncoder::new();
    let families = state.metrics.registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding error: {}", e),
        )
            .into_response(),
    }
}

/// POST /v1/admin/refresh
///
/// Run one refresh now and report how it went.
async fn refresh_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutting_down.load(Ordering::Relaxed) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "shutting down"})),
        )
            .into_response();
    }

    let body = match state.refresher.refresh_once().await {
        RefreshOutcome::Completed { sources, persisted } => serde_json::json!({
            "status": "completed",
            "sources": sources,
            "persisted": persisted,
        }),
        RefreshOutcome::Empty => serde_json::json!({"status": "empty"}),
        RefreshOutcome::Skipped => serde_json::json!({"status": "skipped"}),
    };
    (StatusCode::OK, Json(body)).into_response()
}
