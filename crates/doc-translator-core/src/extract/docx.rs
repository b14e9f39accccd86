use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event};
use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::{DocumentMetadata, ElementType, ExtractedContent, Extractor, StructuralElement};
use crate::error::{Error, Result};
use crate::util::escape_html;

/// Signature of OLE2 compound files (legacy Word `.doc`).
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Word documents stored as Office Open XML (`.docx`).
///
/// Legacy `.doc` uploads are routed here as well; they are not zip
/// containers and fail with a hint to convert them.
pub struct DocxExtractor;

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    numbered: bool,
    text: String,
}

impl Paragraph {
    /// Heading level from a `Title` or `HeadingN` style, capped at 3.
    fn heading_level(&self) -> Option<u8> {
        let style = self.style.as_deref()?.to_ascii_lowercase().replace(' ', "");
        if style == "title" {
            return Some(1);
        }
        let level = style.strip_prefix("heading")?;
        let level: u8 = level.parse().unwrap_or(1);
        Some(level.clamp(1, 3))
    }
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    if bytes.starts_with(&OLE_MAGIC) {
        return Err(Error::ExtractionFailed(
            "legacy binary .doc files are not supported; save the document as .docx and upload it again"
                .to_string(),
        ));
    }
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::ExtractionFailed(format!("not a valid Word document: {e}")))
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let Ok(mut entry) = archive.by_name(name) else {
        return Ok(None);
    };
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| Error::ExtractionFailed(format!("failed to read {name}: {e}")))?;
    Ok(Some(xml))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

/// Collect the paragraphs of `word/document.xml`.
fn parse_paragraphs(xml: &str) -> Result<Vec<Paragraph>> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<Paragraph> = None;
    let mut in_text_node = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => current = Some(Paragraph::default()),
                b"w:t" => in_text_node = true,
                b"w:pStyle" => {
                    if let Some(ref mut p) = current {
                        p.style = attribute(e, b"w:val");
                    }
                }
                b"w:numPr" => {
                    if let Some(ref mut p) = current {
                        p.numbered = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if let Some(ref mut p) = current {
                    match e.name().as_ref() {
                        b"w:pStyle" => p.style = attribute(e, b"w:val"),
                        b"w:numPr" => p.numbered = true,
                        b"w:tab" => p.text.push('\t'),
                        // One paragraph is one line of text
                        b"w:br" | b"w:cr" => p.text.push(' '),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text_node && let Some(ref mut p) = current {
                    let value = e
                        .unescape()
                        .map_err(|err| Error::ExtractionFailed(format!("invalid document XML: {err}")))?;
                    p.text.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => {
                    if let Some(p) = current.take()
                        && !p.text.trim().is_empty()
                    {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(Error::ExtractionFailed(format!("invalid document XML: {err}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Title and author from `docProps/core.xml`.
fn parse_core_properties(xml: &str) -> (Option<String>, Option<String>) {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut field: Option<&'static str> = None;
    let (mut title, mut author) = (None, None);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                field = match e.name().as_ref() {
                    b"dc:title" => Some("title"),
                    b"dc:creator" => Some("author"),
                    _ => None,
                };
            }
            Ok(Event::Text(e)) => {
                let value = e.unescape().ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
                match field {
                    Some("title") => title = value,
                    Some("author") => author = value,
                    _ => {}
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (title, author)
}

/// Render paragraphs as `h1..h3`, `p` and grouped `ul/li` elements.
fn render(paragraphs: &[Paragraph]) -> (Vec<StructuralElement>, String) {
    let mut structure = Vec::with_capacity(paragraphs.len());
    let mut html = String::from("<div class=\"document-content\">\n");
    let mut in_list = false;

    for (index, p) in paragraphs.iter().enumerate() {
        let content = p.text.trim();
        let escaped = escape_html(content);
        let heading = p.heading_level();

        let kind = if heading.is_some() {
            ElementType::Heading
        } else if p.numbered {
            ElementType::ListItem
        } else {
            ElementType::Paragraph
        };

        if in_list && kind != ElementType::ListItem {
            html.push_str("  </ul>\n");
            in_list = false;
        }

        match (kind, heading) {
            (ElementType::Heading, Some(level)) => {
                html.push_str(&format!("  <h{level}>{escaped}</h{level}>\n"));
            }
            (ElementType::ListItem, _) => {
                if !in_list {
                    html.push_str("  <ul>\n");
                    in_list = true;
                }
                html.push_str(&format!("    <li>{escaped}</li>\n"));
            }
            _ => html.push_str(&format!("  <p>{escaped}</p>\n")),
        }

        structure.push(StructuralElement {
            kind,
            content: content.to_string(),
            index,
        });
    }

    if in_list {
        html.push_str("  </ul>\n");
    }
    html.push_str("</div>");
    (structure, html)
}

impl Extractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedContent> {
        let mut archive = open_archive(bytes)?;
        let document = read_entry(&mut archive, "word/document.xml")?.ok_or_else(|| {
            Error::ExtractionFailed("missing word/document.xml in Word document".to_string())
        })?;

        let paragraphs = parse_paragraphs(&document)?;
        if paragraphs.is_empty() {
            return Err(Error::ExtractionFailed("no text found in Word document".to_string()));
        }

        let (title, author) = read_entry(&mut archive, "docProps/core.xml")?
            .map(|xml| parse_core_properties(&xml))
            .unwrap_or_default();

        let text = paragraphs
            .iter()
            .map(|p| p.text.trim())
            .collect::<Vec<_>>()
            .join("\n");
        let (structure, html) = render(&paragraphs);

        Ok(ExtractedContent {
            metadata: DocumentMetadata {
                title,
                author,
                ..DocumentMetadata::for_text(&text)
            },
            text,
            html,
            structure,
            extraction_method: "docx".to_string(),
        })
    }
}
