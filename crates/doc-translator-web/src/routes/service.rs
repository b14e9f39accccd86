//! Service routes - status and cache management.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::helpers::{ApiResult, success};
use crate::state::AppState;

pub async fn service_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    success(&state.pipeline.status())
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    success(&json!({ "cacheStats": state.pipeline.cache_stats() }))
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.pipeline.clear_cache();
    info!("Translation cache cleared");
    success(&json!({ "message": "Translation cache cleared successfully" }))
}
