//! Line classification and structural HTML.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::util::{escape_html, non_blank_lines};

/// Lines at or above this length are never headings.
const MAX_HEADING_CHARS: usize = 100;

#[allow(clippy::expect_used)] // Literal patterns
static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- Page \d+ ---$").expect("valid regex"));
#[allow(clippy::expect_used)]
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-•·*]\s").expect("valid regex"));
#[allow(clippy::expect_used)]
static NUMBERED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[.)]\s").expect("valid regex"));
#[allow(clippy::expect_used)]
static NUMBERED_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.?\s").expect("valid regex"));
#[allow(clippy::expect_used)]
static SECTION_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(chapter|section|part|title)\s+[0-9ivx]+").expect("valid regex")
});

/// Classification of one line of extracted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    Heading,
    Paragraph,
    ListItem,
    PageMarker,
}

impl ElementType {
    /// CSS class used for the line's container element.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::ListItem => "list-item",
            Self::PageMarker => "page-marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralElement {
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub content: String,
    pub index: usize,
}

/// Page boundary line inserted between PDF pages.
pub fn page_marker(page: usize) -> String {
    format!("--- Page {page} ---")
}

pub fn is_page_marker(line: &str) -> bool {
    PAGE_MARKER.is_match(line.trim())
}

fn is_all_caps(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

fn is_heading(line: &str) -> bool {
    line.chars().count() < MAX_HEADING_CHARS
        && (is_all_caps(line)
            || NUMBERED_HEADING.is_match(line)
            || line.ends_with(':')
            || SECTION_KEYWORD.is_match(line))
}

/// Classify a trimmed, non-blank line.
pub fn classify_line(line: &str) -> ElementType {
    if PAGE_MARKER.is_match(line) {
        ElementType::PageMarker
    } else if is_heading(line) {
        ElementType::Heading
    } else if BULLET.is_match(line) || NUMBERED_LIST.is_match(line) {
        ElementType::ListItem
    } else {
        ElementType::Paragraph
    }
}

/// Classify every non-blank line of `text` and render the matching HTML.
pub fn structure_text(text: &str) -> (Vec<StructuralElement>, String) {
    let structure: Vec<_> = non_blank_lines(text)
        .enumerate()
        .map(|(index, line)| StructuralElement {
            kind: classify_line(line),
            content: line.to_string(),
            index,
        })
        .collect();
    let html = structure_html(&structure);
    (structure, html)
}

/// Render elements as one `<div class="{type}" data-index="{i}">` per line
/// inside a `document-content` container, with the line text escaped.
pub fn structure_html(elements: &[StructuralElement]) -> String {
    let mut html = String::from("<div class=\"document-content\">\n");
    for element in elements {
        html.push_str(&format!(
            "  <div class=\"{}\" data-index=\"{}\">{}</div>\n",
            element.kind.as_str(),
            element.index,
            escape_html(&element.content)
        ));
    }
    html.push_str("</div>");
    html
}
