//! Document text extraction.
//!
//! Each supported format has an [`Extractor`] that turns raw file bytes into
//! [`ExtractedContent`]: plain text, classified lines and a structural HTML
//! rendering that translation later writes back into.

mod docx;
mod pdf;
mod structure;
mod text;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use structure::{
    ElementType, StructuralElement, classify_line, is_page_marker, page_marker, structure_html,
    structure_text,
};
pub use text::TextExtractor;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::LimitsConfig;
use crate::error::{Error, Result};

/// Supported upload formats, resolved from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Txt,
    Docx,
    Doc,
    Pdf,
}

impl DocumentFormat {
    /// Resolve the format from a file name (case-insensitive extension).
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(Self::Txt),
            "docx" => Ok(Self::Docx),
            "doc" => Ok(Self::Doc),
            "pdf" => Ok(Self::Pdf),
            "" => Err(Error::UnsupportedFormat(format!("{file_name} has no extension"))),
            other => Err(Error::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Pdf => "pdf",
        }
    }

    /// PDF extraction can be slow, so it runs as a polled background job.
    pub const fn requires_progress(self) -> bool {
        matches!(self, Self::Pdf)
    }

    /// Extractor for this format.
    pub fn extractor(self, limits: &LimitsConfig) -> Box<dyn Extractor> {
        match self {
            Self::Txt => Box::new(TextExtractor),
            Self::Docx | Self::Doc => Box::new(DocxExtractor),
            Self::Pdf => Box::new(PdfExtractor::new(limits.min_pdf_text_chars)),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Document statistics reported with the extracted text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    pub words: usize,
    pub characters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl DocumentMetadata {
    /// Word and character counts for `text`.
    pub fn for_text(text: &str) -> Self {
        Self {
            words: crate::util::word_count(text),
            characters: text.chars().count(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub text: String,
    pub html: String,
    pub structure: Vec<StructuralElement>,
    pub metadata: DocumentMetadata,
    pub extraction_method: String,
}

impl ExtractedContent {
    /// Build content from plain text using the line structuring pass.
    pub fn from_text(text: String, method: &str, mut metadata: DocumentMetadata) -> Self {
        let (structure, html) = structure_text(&text);
        let counts = DocumentMetadata::for_text(&text);
        metadata.words = counts.words;
        metadata.characters = counts.characters;

        Self {
            text,
            html,
            structure,
            metadata,
            extraction_method: method.to_string(),
        }
    }
}

/// Format-specific text extraction.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedContent>;
}

/// Extract `bytes` according to the extension of `file_name`.
pub fn extract(bytes: &[u8], file_name: &str, limits: &LimitsConfig) -> Result<ExtractedContent> {
    let format = DocumentFormat::from_file_name(file_name)?;
    let content = format.extractor(limits).extract(bytes)?;
    info!(
        "Extracted {} words from {} ({})",
        content.metadata.words, file_name, content.extraction_method
    );
    Ok(content)
}

/// Run [`extract`] on the blocking pool under the configured timeout.
pub async fn extract_with_timeout(
    bytes: Vec<u8>,
    file_name: String,
    limits: &LimitsConfig,
) -> Result<ExtractedContent> {
    if bytes.len() > limits.max_upload_bytes {
        return Err(Error::PayloadTooLarge {
            what: "file",
            size: bytes.len(),
            limit: limits.max_upload_bytes,
        });
    }

    let seconds = limits.extraction_timeout_secs;
    let task_limits = limits.clone();
    let task = tokio::task::spawn_blocking(move || extract(&bytes, &file_name, &task_limits));

    match tokio::time::timeout(Duration::from_secs(seconds), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Error::ExtractionFailed(format!(
            "extraction task failed: {join_error}"
        ))),
        Err(_) => Err(Error::UploadTimeout { seconds }),
    }
}
