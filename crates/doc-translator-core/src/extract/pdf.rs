use mupdf::{Document as MuDocument, MetadataName, TextPageOptions};
use tracing::{debug, warn};

use super::{DocumentMetadata, ExtractedContent, Extractor, page_marker};
use crate::error::{Error, Result};

/// PDF text layer extraction through mupdf.
///
/// Multi-page documents get a `--- Page N ---` line before each page. A text
/// layer shorter than `min_text_chars` means the PDF is a scan; OCR is not
/// available, so extraction fails instead of returning near-empty text.
pub struct PdfExtractor {
    min_text_chars: usize,
}

impl PdfExtractor {
    pub const fn new(min_text_chars: usize) -> Self {
        Self { min_text_chars }
    }
}

/// Text of one page: one output line per mupdf line, blank line between blocks.
fn page_text(doc: &MuDocument, page_index: i32) -> Result<String> {
    let page = doc.load_page(page_index).map_err(|e| {
        Error::ExtractionFailed(format!("failed to load page {}: {e}", page_index + 1))
    })?;
    let text_page = page.to_text_page(TextPageOptions::empty()).map_err(|e| {
        Error::ExtractionFailed(format!("failed to read text on page {}: {e}", page_index + 1))
    })?;

    let mut text = String::new();
    for block in text_page.blocks() {
        let mut block_text = String::new();
        for line in block.lines() {
            let line_text: String = line.chars().filter_map(|c| c.char()).collect();
            let line_text = line_text.trim();
            if !line_text.is_empty() {
                block_text.push_str(line_text);
                block_text.push('\n');
            }
        }
        if !block_text.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&block_text);
        }
    }
    Ok(text)
}

impl Extractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedContent> {
        let doc = MuDocument::from_bytes(bytes, "")
            .map_err(|e| Error::PdfOpen(format!("Failed to parse PDF: {e}")))?;
        let page_count = doc
            .page_count()
            .map_err(|e| Error::PdfOpen(format!("Failed to get page count: {e}")))?;

        let mut text = String::new();
        let mut content_chars = 0;
        for page_index in 0..page_count {
            let page = page_text(&doc, page_index)?;
            content_chars += page.trim().chars().count();

            if page_count > 1 {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&page_marker(usize::try_from(page_index + 1).unwrap_or(0)));
                text.push('\n');
            }
            text.push_str(&page);
        }

        debug!("PDF text layer: {} pages, {} chars", page_count, content_chars);

        if content_chars < self.min_text_chars {
            warn!("PDF has only {} characters of text, treating as scanned", content_chars);
            return Err(Error::ExtractionFailed(format!(
                "the PDF contains almost no selectable text ({content_chars} characters); \
                 it appears to be a scanned image and OCR is not supported"
            )));
        }

        let get_meta = |name| -> Option<String> { doc.metadata(name).ok().filter(|s| !s.is_empty()) };
        let metadata = DocumentMetadata {
            pages: usize::try_from(page_count).ok(),
            title: get_meta(MetadataName::Title),
            author: get_meta(MetadataName::Author),
            ..DocumentMetadata::default()
        };

        Ok(ExtractedContent::from_text(text, "mupdf", metadata))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extract::ElementType;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream};

    /// Build a PDF with one text line per page using the base Helvetica font.
    fn create_test_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let page_tree_id = doc.new_object_id();

        let font_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(lopdf::Dictionary::from_iter([(
            "Font",
            Object::Dictionary(lopdf::Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for page_text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*page_text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(lopdf::Dictionary::new(), content.encode().unwrap()));
            kids.push(Object::Reference(doc.add_object(lopdf::Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(page_tree_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
                ("MediaBox", Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
            ]))));
        }

        let count = i64::try_from(kids.len()).unwrap();
        doc.objects.insert(
            page_tree_id,
            Object::Dictionary(lopdf::Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(kids)),
                ("Count", Object::Integer(count)),
            ])),
        );
        let catalog_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(page_tree_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut output = Vec::new();
        doc.save_to(&mut output).unwrap();
        output
    }

    #[test]
    fn test_single_page_has_no_marker() {
        let pdf = create_test_pdf(&["The quarterly report describes revenue growth in every region."]);
        let content = PdfExtractor::new(10).extract(&pdf).unwrap();

        assert!(content.text.contains("quarterly report"));
        assert!(!content.text.contains("--- Page"));
        assert_eq!(content.metadata.pages, Some(1));
        assert_eq!(content.extraction_method, "mupdf");
    }

    #[test]
    fn test_multi_page_gets_page_markers() {
        let pdf = create_test_pdf(&[
            "First page talks about the introduction.",
            "Second page holds the conclusion.",
        ]);
        let content = PdfExtractor::new(10).extract(&pdf).unwrap();

        let markers: Vec<_> = content
            .structure
            .iter()
            .filter(|e| e.kind == ElementType::PageMarker)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(markers, vec!["--- Page 1 ---", "--- Page 2 ---"]);
        assert_eq!(content.metadata.pages, Some(2));
    }

    #[test]
    fn test_scanned_pdf_is_rejected() {
        let pdf = create_test_pdf(&["12"]);
        let err = PdfExtractor::new(50).extract(&pdf).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(ref msg) if msg.contains("OCR")));
    }

    #[test]
    fn test_invalid_pdf() {
        let err = PdfExtractor::new(50).extract(b"not a pdf").unwrap_err();
        assert_eq!(err.kind(), "extraction_failed");
    }
}
