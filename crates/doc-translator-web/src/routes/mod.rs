//! HTTP route handlers for the document translator service.
//!
//! All routes return JSON except the PDF download and the SSE progress stream.

mod download;
mod jobs;
mod service;
mod translate;
mod upload;

pub use download::download_pdf;
pub use jobs::{cancel_job, cleanup_job};
pub use service::{cache_stats, clear_cache, service_status};
pub use translate::{extraction_progress, progress_stream, start_translation, translation_progress};
pub use upload::upload_document;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::state::AppState;

/// Build the application router with its middleware stack.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        .route("/api/translation/upload", post(upload_document))
        .route("/api/translation/extraction/{id}", get(extraction_progress))
        .route("/api/translation/translate", post(start_translation))
        .route("/api/translation/progress/{id}", get(translation_progress))
        .route("/api/translation/progress/{id}/stream", get(progress_stream))
        .route("/api/translation/download/{id}", get(download_pdf))
        .route("/api/translation/cleanup/{id}", delete(cleanup_job))
        .route("/api/translation/cancel/{id}", post(cancel_job))
        .route("/api/translation/status", get(service_status))
        .route("/api/translation/cache/stats", get(cache_stats))
        .route("/api/translation/cache", delete(clear_cache))
        // Progress must never be served from a cache
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, max-age=0"),
        ))
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use doc_translator_core::{
        AppConfig, Lang, Pipeline, RenderEngine, Result, TranslationCache, Translator,
        create_renderer, translator::TranslatorInfo,
    };
    use futures::StreamExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    struct UppercaseTranslator;

    #[async_trait]
    impl Translator for UppercaseTranslator {
        fn info(&self) -> TranslatorInfo {
            TranslatorInfo {
                name: "uppercase",
                requires_api_key: false,
                supports_auto_detect: true,
            }
        }

        async fn translate(&self, text: &str, _source: &Lang, _target: &Lang) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    fn app() -> Router {
        app_with(AppConfig::default())
    }

    fn app_with(mut config: AppConfig) -> Router {
        config.batch.batch_pause_ms = 0;
        config.render.engine = RenderEngine::Builtin;
        let cache = Arc::new(TranslationCache::in_memory(100));
        let renderer = create_renderer(&config.render);
        let pipeline =
            Pipeline::with_components(config, Arc::new(UppercaseTranslator), cache, renderer);
        router(Arc::new(AppState::with_pipeline(pipeline)))
    }

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    fn multipart_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/translation/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn poll_until_done(app: &Router, id: &str) -> Value {
        for _ in 0..500 {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/api/translation/progress/{id}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            if body["completed"] == true || body["failed"] == true {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("translation {id} did not finish");
    }

    #[tokio::test]
    async fn test_txt_upload_translate_and_download() {
        let app = app();
        let text = "The first paragraph talks about the weather today.\n\n\
                    The second paragraph describes the local market.\n\n\
                    The third paragraph ends the short story here.";

        let response = app
            .clone()
            .oneshot(multipart_request("document", "story.txt", text.as_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let upload = body_json(response).await;
        assert_eq!(upload["success"], true);
        assert_eq!(upload["requiresProgress"], false);
        let content = &upload["extractedContent"];
        let structure = content["structure"].as_array().unwrap();
        assert_eq!(structure.len(), 3);
        assert!(structure.iter().all(|e| e["type"] == "paragraph"));

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/translation/translate",
                &json!({
                    "text": content["text"],
                    "html": content["html"],
                    "structure": content["structure"],
                    "targetLanguage": "de",
                    "fileName": "story.txt",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let started = body_json(response).await;
        let id = started["translationId"].as_str().unwrap().to_string();

        let progress = poll_until_done(&app, &id).await;
        assert_eq!(progress["completed"], true);
        assert_eq!(progress["progress"], 100);
        assert_eq!(progress["hasPdf"], true);
        assert!(progress["result"].as_str().unwrap().contains("THE FIRST PARAGRAPH"));
        assert!(progress.get("pdf").is_none());

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/translation/download/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment;"));
        assert!(disposition.contains("translated_story.pdf"));
        let pdf = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/api/translation/cleanup/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request(&format!("/api/translation/progress/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_400() {
        let response = app()
            .oneshot(multipart_request("file", "image.xyz", b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errorType"], "unsupported_format");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_upload_without_file_is_400() {
        let response = app()
            .oneshot(multipart_request("other", "a.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stalled_upload_body_is_408() {
        let mut config = AppConfig::default();
        config.limits.upload_timeout_secs = 1;

        // Headers and a little content arrive, then the client goes quiet
        let head = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"slow.txt\"\r\nContent-Type: text/plain\r\n\r\nfirst bytes"
        );
        let body = futures::stream::iter([Ok::<_, std::io::Error>(head.into_bytes())])
            .chain(futures::stream::pending());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/translation/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from_stream(body))
            .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(10), app_with(config).oneshot(request))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["errorType"], "upload_timeout");
    }

    #[tokio::test]
    async fn test_oversized_text_is_413() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/translation/translate",
                &json!({ "text": "a".repeat(250_000), "targetLanguage": "en" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["errorType"], "payload_too_large");
    }

    #[tokio::test]
    async fn test_missing_target_language_is_400() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/translation/translate",
                &json!({ "text": "Hello." }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["errorType"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_404() {
        let app = app();
        for uri in [
            "/api/translation/progress/nope",
            "/api/translation/extraction/nope",
            "/api/translation/download/nope",
            "/api/translation/progress/nope/stream",
        ] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/translation/cleanup/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["errorType"], "job_not_found");
    }

    #[tokio::test]
    async fn test_status_and_cache_endpoints() {
        let app = app();

        let response = app.clone().oneshot(get_request("/api/translation/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["renderer"], "builtin");
        assert_eq!(status["provider"], "uppercase");
        assert_eq!(status["limits"]["max_text_chars"], 200_000);

        let response = app
            .clone()
            .oneshot(get_request("/api/translation/cache/stats"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["cacheStats"]["size"], 0);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/translation/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
