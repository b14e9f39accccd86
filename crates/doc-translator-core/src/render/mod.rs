//! Reconciled HTML to PDF.
//!
//! Chromium gives print-quality output when it is installed; the built-in
//! lopdf renderer always works and is what `auto` degrades to.

mod builtin;
mod chromium;
mod font;
mod template;

pub use builtin::{BuiltinRenderer, render_pdf};
pub use chromium::{ChromiumRenderer, DEFAULT_CHROMIUM};
pub use font::FontData;
pub use template::DocumentPage;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::config::{RenderConfig, RenderEngine};
use crate::error::{Error, Result};

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Engine name reported by the status endpoint
    fn name(&self) -> &'static str;

    /// Render the structural HTML of a document to PDF bytes.
    async fn render(&self, html: &str, source_file_name: &str) -> Result<Vec<u8>>;
}

/// Tries `primary` first and falls back on [`Error::RenderFailed`].
pub struct FallbackRenderer {
    primary: Arc<dyn PdfRenderer>,
    fallback: Arc<dyn PdfRenderer>,
}

impl FallbackRenderer {
    pub fn new(primary: Arc<dyn PdfRenderer>, fallback: Arc<dyn PdfRenderer>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PdfRenderer for FallbackRenderer {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn render(&self, html: &str, source_file_name: &str) -> Result<Vec<u8>> {
        match self.primary.render(html, source_file_name).await {
            Err(Error::RenderFailed(reason)) => {
                warn!(
                    "{} renderer failed ({}), falling back to {}",
                    self.primary.name(),
                    reason,
                    self.fallback.name()
                );
                self.fallback.render(html, source_file_name).await
            }
            other => other,
        }
    }
}

/// Create the renderer selected by `config.engine`.
pub fn create_renderer(config: &RenderConfig) -> Arc<dyn PdfRenderer> {
    match config.engine {
        RenderEngine::Chromium => Arc::new(ChromiumRenderer::from_config(config)),
        RenderEngine::Builtin => Arc::new(BuiltinRenderer::from_config(config)),
        RenderEngine::Auto => Arc::new(FallbackRenderer::new(
            Arc::new(ChromiumRenderer::from_config(config)),
            Arc::new(BuiltinRenderer::from_config(config)),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Broken {
        calls: AtomicUsize,
        error: fn() -> Error,
    }

    #[async_trait]
    impl PdfRenderer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn render(&self, _html: &str, _source_file_name: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    #[test]
    fn test_create_renderer_names() {
        let mut config = RenderConfig::default();
        assert_eq!(create_renderer(&config).name(), "auto");
        config.engine = RenderEngine::Chromium;
        assert_eq!(create_renderer(&config).name(), "chromium");
        config.engine = RenderEngine::Builtin;
        assert_eq!(create_renderer(&config).name(), "builtin");
    }

    #[tokio::test]
    async fn test_auto_degrades_to_builtin_when_chromium_is_missing() {
        let config = RenderConfig {
            engine: RenderEngine::Auto,
            chromium_path: Some(PathBuf::from("/nonexistent/chromium-binary")),
            timeout_secs: 5,
            font_path: None,
        };
        let pdf = create_renderer(&config)
            .render("<div class=\"paragraph\" data-index=\"0\">Hello</div>", "a.txt")
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_only_render_failures_fall_back() {
        let primary = Arc::new(Broken {
            calls: AtomicUsize::new(0),
            error: || Error::Cancelled,
        });
        let renderer = FallbackRenderer::new(primary.clone(), Arc::new(BuiltinRenderer::default()));

        let err = renderer.render("<p>x</p>", "a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_error_is_returned_when_both_fail() {
        let failing = || Error::RenderFailed("no engine".to_string());
        let renderer = FallbackRenderer::new(
            Arc::new(Broken { calls: AtomicUsize::new(0), error: failing }),
            Arc::new(Broken { calls: AtomicUsize::new(0), error: failing }),
        );
        let err = renderer.render("<p>x</p>", "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), "render_failed");
    }
}
