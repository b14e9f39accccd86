//! Translation routes - start a job and poll its progress.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::sse::{Event, KeepAlive, Sse},
};
use doc_translator_core::{JobKind, JobRecord, TranslationRequest};
use futures::stream::Stream;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::helpers::{ApiError, ApiResult, OptionExt, success};
use crate::state::AppState;

const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Start translating extracted text; returns the `translationId` to poll.
///
/// Missing text or target language is rejected with 400 before any job exists.
pub async fn start_translation(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TranslationRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let translation_id = state.pipeline.start_translation(request).await?;
    success(&json!({
        "translationId": translation_id,
        "message": "Document translation started",
    }))
}

/// Record of job `id` when it has the expected kind.
async fn job_of_kind(state: &AppState, id: &str, kind: JobKind) -> ApiResult<Arc<JobRecord>> {
    let record = state.pipeline.get(id).await?;
    Some(record)
        .filter(|record| record.kind == kind)
        .or_not_found("Job not found")
}

/// Poll a PDF extraction job.
pub async fn extraction_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = job_of_kind(&state, &id, JobKind::Extraction).await?;
    success(&*record)
}

/// Poll a translation job. `hasPdf` tells whether the download is ready.
pub async fn translation_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = job_of_kind(&state, &id, JobKind::Translation).await?;
    let Json(mut body) = success(&*record)?;
    body["hasPdf"] = Value::Bool(record.has_pdf());
    Ok(Json(body))
}

/// SSE stream of job records for any job kind.
///
/// Pushes a `progress` event whenever the record changes and ends after the
/// job reaches a terminal state. A job that disappears mid-stream (cleanup or
/// expiry) ends the stream with a `gone` event.
#[allow(tail_expr_drop_order)] // Drop order change in async_stream macro is harmless here
pub async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 up front rather than an empty stream
    state.pipeline.get(&id).await?;

    let stream = async_stream::stream! {
        let mut last_update = None;

        loop {
            let Ok(record) = state.pipeline.get(&id).await else {
                yield Ok(Event::default().event("gone").data(id.clone()));
                break;
            };

            if last_update != Some(record.updated_at) {
                last_update = Some(record.updated_at);
                let mut body = serde_json::to_value(&*record).unwrap_or_default();
                body["hasPdf"] = Value::Bool(record.has_pdf());
                yield Ok(Event::default().event("progress").data(body.to_string()));
            }

            if record.state.is_terminal() {
                break;
            }
            tokio::time::sleep(STREAM_POLL_INTERVAL).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
