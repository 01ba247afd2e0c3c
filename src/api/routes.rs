//! API route definitions.

use crate::api::state::AppState;
use crate::storage::{stats, StoreError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(global_stats))
        .route("/events/recent", get(recent_events))
        .route("/events/by-type", get(events_by_type))
        .route("/events/by-server", get(events_by_server))
        .route("/incidents", get(list_incidents))
        .route("/incidents/breakdown", get(incident_breakdown))
        .route("/incidents/by-day", get(incidents_by_day))
        .route("/sources/top", get(top_sources))
}

pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "API request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": self.0 }))).into_response()
    }
}

/// Run a store query off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(e.to_string()))?
        .map_err(|e| ApiError(e.to_string()))
}

fn listing<T: serde::Serialize>(items: Vec<T>) -> Json<Value> {
    let total = items.len();
    Json(json!({ "data": items, "meta": { "total": total } }))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, 1000)
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn global_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.store.pool().clone();
    let stats = blocking(move || stats::global_stats(&pool)).await?;
    Ok(Json(json!({ "data": stats })))
}

async fn recent_events(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.or(50);
    let store = state.store.clone();
    Ok(listing(blocking(move || store.recent_events(limit)).await?))
}

async fn events_by_type(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.store.pool().clone();
    Ok(listing(blocking(move || stats::events_by_type(&pool)).await?))
}

async fn events_by_server(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.store.pool().clone();
    Ok(listing(blocking(move || stats::events_by_server(&pool)).await?))
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.or(100);
    let store = state.store.clone();
    Ok(listing(blocking(move || store.recent_incidents(limit)).await?))
}

async fn incident_breakdown(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.store.pool().clone();
    Ok(listing(blocking(move || stats::incident_breakdown(&pool)).await?))
}

async fn incidents_by_day(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.store.pool().clone();
    Ok(listing(blocking(move || stats::incidents_by_day(&pool, 30)).await?))
}

async fn top_sources(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.or(10) as i64;
    let pool = state.store.pool().clone();
    Ok(listing(blocking(move || stats::top_failing_sources(&pool, limit)).await?))
}
