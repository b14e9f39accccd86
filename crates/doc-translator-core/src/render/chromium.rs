use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::PdfRenderer;
use super::template::DocumentPage;
use crate::config::RenderConfig;
use crate::error::{Error, Result};

/// Default executable looked up on `PATH`.
pub const DEFAULT_CHROMIUM: &str = "chromium";

/// Discard port on loopback; requests routed here never leave the host.
const DEAD_PROXY: &str = "127.0.0.1:9";

/// Prints the document page to PDF with a headless Chromium process.
pub struct ChromiumRenderer {
    executable: PathBuf,
    timeout: Duration,
}

impl ChromiumRenderer {
    pub const fn new(executable: PathBuf, timeout: Duration) -> Self {
        Self { executable, timeout }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(
            config
                .chromium_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHROMIUM)),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Headless print of `page`, kept inside the sandbox with scripts off and
    /// every network request sent to an unreachable proxy.
    fn command(&self, page: &std::path::Path, output: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-remote-fonts")
            .arg("--blink-settings=scriptEnabled=false,imagesEnabled=false")
            .arg(format!("--proxy-server={DEAD_PROXY}"))
            .arg("--proxy-bypass-list=<-loopback>")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", page.display()))
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn render(&self, html: &str, source_file_name: &str) -> Result<Vec<u8>> {
        let page = DocumentPage::new(html, source_file_name, Utc::now()).to_html()?;

        let dir = tempfile::tempdir()
            .map_err(|e| Error::RenderFailed(format!("Failed to create temp dir: {e}")))?;
        let page_path = dir.path().join("document.html");
        let output_path = dir.path().join("document.pdf");
        tokio::fs::write(&page_path, page)
            .await
            .map_err(|e| Error::RenderFailed(format!("Failed to write page: {e}")))?;

        debug!("Launching {} for {}", self.executable.display(), source_file_name);

        let output = tokio::time::timeout(self.timeout, self.command(&page_path, &output_path).output())
            .await
            .map_err(|_| {
                Error::RenderFailed(format!(
                    "Chromium timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                Error::RenderFailed(format!(
                    "Failed to launch {}: {e}",
                    self.executable.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::RenderFailed(format!(
                "Chromium exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pdf = tokio::fs::read(&output_path)
            .await
            .map_err(|e| Error::RenderFailed(format!("Chromium produced no PDF: {e}")))?;
        if !pdf.starts_with(b"%PDF") {
            return Err(Error::RenderFailed("Chromium output is not a PDF".to_string()));
        }

        info!("Rendered {} bytes of PDF with Chromium", pdf.len());
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_command_keeps_sandbox_and_blocks_network() {
        let renderer = ChromiumRenderer::new(PathBuf::from("chromium"), Duration::from_secs(5));
        let cmd = renderer.command(Path::new("/tmp/x/document.html"), Path::new("/tmp/x/document.pdf"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(!args.iter().any(|a| a == "--no-sandbox"));
        assert!(args.iter().any(|a| a.contains("scriptEnabled=false")));
        assert!(args.contains(&format!("--proxy-server={DEAD_PROXY}")));
        assert!(args.contains(&"--proxy-bypass-list=<-loopback>".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("file:///tmp/x/document.html"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_render_failure() {
        let renderer = ChromiumRenderer::new(
            PathBuf::from("/nonexistent/chromium-binary"),
            Duration::from_secs(5),
        );
        let err = renderer.render("<p>x</p>", "a.txt").await;
        assert!(matches!(err, Err(Error::RenderFailed(ref msg)) if msg.contains("launch")));
    }

    #[tokio::test]
    async fn test_failing_process_is_render_failure() {
        // `false` exits non-zero without writing anything
        let renderer = ChromiumRenderer::new(PathBuf::from("false"), Duration::from_secs(5));
        let err = renderer.render("<p>x</p>", "a.txt").await;
        assert!(matches!(err, Err(Error::RenderFailed(_))));
    }
}
