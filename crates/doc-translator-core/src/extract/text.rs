use super::{DocumentMetadata, ExtractedContent, Extractor};
use crate::error::{Error, Result};

/// Plain text files, decoded as UTF-8 with invalid sequences replaced.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedContent> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.trim().is_empty() {
            return Err(Error::ExtractionFailed("no text found in file".to_string()));
        }
        Ok(ExtractedContent::from_text(text, "direct", DocumentMetadata::default()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extract::ElementType;

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let content = TextExtractor.extract(b"caf\xe9 ok").unwrap();
        assert_eq!(content.text, "caf\u{FFFD} ok");
    }

    #[test]
    fn test_structure_follows_lines() {
        let content = TextExtractor
            .extract("OVERVIEW\n\nThe system translates documents.\n* one\n* two\n".as_bytes())
            .unwrap();

        let kinds: Vec<_> = content.structure.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::ListItem,
                ElementType::ListItem
            ]
        );
        assert_eq!(content.metadata.pages, None);
    }

    #[test]
    fn test_blank_file_fails() {
        for input in [&b""[..], b"  \n\n  ", b"\t\r\n"] {
            assert!(matches!(
                TextExtractor.extract(input),
                Err(Error::ExtractionFailed(ref msg)) if msg.contains("no text")
            ));
        }
    }
}
