//! Download routes - translated PDF download.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::sync::Arc;
use tracing::info;

use crate::helpers::{ApiResult, ResultExt};
use crate::state::AppState;

/// `translated_<stem>.pdf`, restricted to characters safe in a header value.
fn download_name(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("translated_{safe}.pdf")
}

/// Download the PDF of a completed translation job.
///
/// 404 for an unknown job, 400 while the job has not completed.
pub async fn download_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let pdf = state.pipeline.pdf(&id).await?;
    info!("PDF downloaded: {} ({} bytes)", id, pdf.bytes.len());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, pdf.bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name(&pdf.file_name)),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(pdf.bytes))
        .or_internal_error()
}
