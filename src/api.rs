//! Read-only query surface for the polling display client. Every endpoint
//! returns a point-in-time JSON snapshot; fetch/parse failures below the
//! pool boundary never surface here — only genuine absence of data does.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::lanes::MultiLanePool;
use crate::pool::ContentPool;

const DEFAULT_RANDOM_COUNT: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub news: Arc<ContentPool>,
    pub market: Arc<MultiLanePool>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/next", get(next))
        .route("/random", get(random))
        .route("/refresh", get(refresh))
        .route("/lanes/status", get(lanes_status))
        .route("/lanes/next", get(lanes_next))
        .route("/lanes/indices", get(lanes_indices))
        .route("/lanes/sectors", get(lanes_sectors))
        .route("/lanes/bulletins", get(lanes_bulletins))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.news.status()))
}

async fn next(State(state): State<AppState>) -> Json<Value> {
    match state.news.rotating() {
        Some(item) => Json(json!(item)),
        None => Json(json!({ "error": "No news available" })),
    }
}

async fn random(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let count = q
        .get("count")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RANDOM_COUNT);
    Json(json!(state.news.random_sample(count)))
}

/// Fire-and-forget: racing manual triggers may do redundant work, but the
/// merge step is idempotent and atomic, so state cannot be corrupted.
async fn refresh(State(state): State<AppState>) -> Json<Value> {
    let pool = state.news.clone();
    tokio::spawn(async move {
        pool.refresh().await;
    });
    Json(json!({ "message": "Refresh started" }))
}

async fn lanes_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.market.status()))
}

async fn lanes_next(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.market.display_content()))
}

async fn lanes_indices(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.market.indices()))
}

async fn lanes_sectors(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.market.sectors()))
}

async fn lanes_bulletins(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.market.bulletins()))
}
