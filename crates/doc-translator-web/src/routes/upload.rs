//! Upload route - document upload and extraction.

use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartError;
use doc_translator_core::Error;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::helpers::{ApiError, ApiResult, success};
use crate::state::AppState;

/// Multipart fields accepted as the uploaded document.
const FILE_FIELDS: [&str; 2] = ["file", "document"];

fn multipart_error(e: &MultipartError) -> ApiError {
    let status = e.status();
    let error_type = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_request"
    };
    ApiError::new(status, error_type, e.body_text())
}

/// Read the first document field as `(file name, bytes)`.
async fn read_document(multipart: &mut Multipart) -> ApiResult<Option<(String, Vec<u8>)>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        let name = field.name().unwrap_or("").to_string();
        if !FILE_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document.txt").to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(&e))?;
        return Ok(Some((file_name, data.to_vec())));
    }
    Ok(None)
}

/// Upload a document.
///
/// TXT and DOCX content is returned inline. PDFs return an `extractionId`
/// to poll, with `requiresProgress: true`. A body that is not received within
/// `limits.upload_timeout_secs` fails with 408.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let seconds = state.pipeline.config().limits.upload_timeout_secs;
    let document = tokio::time::timeout(Duration::from_secs(seconds), read_document(&mut multipart))
        .await
        .map_err(|_| {
            warn!("Upload not received within {} seconds", seconds);
            Error::UploadTimeout { seconds }
        })??;

    let Some((file_name, data)) = document else {
        return Err(ApiError::bad_request("No file uploaded"));
    };
    info!("Received upload {} ({} bytes)", file_name, data.len());

    let outcome = state.pipeline.upload(data, &file_name).await?;
    success(&outcome)
}
