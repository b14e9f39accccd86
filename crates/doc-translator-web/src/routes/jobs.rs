//! Job lifecycle routes - cancel and cleanup.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::helpers::{ApiResult, success};
use crate::state::AppState;

/// Delete a job's data, cancelling it first if it is still running.
pub async fn cleanup_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.pipeline.cleanup(&id).await?;
    success(&json!({ "message": "Translation data cleaned up" }))
}

/// Stop a running job at its next batch boundary.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.pipeline.cancel(&id).await?;
    success(&json!({ "message": "Cancellation requested" }))
}
