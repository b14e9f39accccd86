//! In-process PDF layout with lopdf.
//!
//! Lays the structural HTML out as flowing text. With a TrueType font
//! available any script it covers is drawn; without one the standard
//! Helvetica faces limit output to WinAnsi text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, StringFormat, Stream};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

use super::PdfRenderer;
use super::font::{FontData, Glyphs};
use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::extract::ElementType;
use crate::util::unescape_html;

// A4 in points, 2 cm margins
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 56.69;
const FOOTER_RESERVE: f32 = 24.0;

const BODY_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 13.0;
const TITLE_SIZE: f32 = 18.0;
const SMALL_SIZE: f32 = 9.0;
const FOOTER_SIZE: f32 = 8.0;
const LINE_SPACING: f32 = 1.45;
/// Average Helvetica glyph width as a fraction of the font size
const AVG_CHAR_WIDTH: f32 = 0.5;
const LIST_INDENT: f32 = 14.0;
/// Horizontal shear of synthesized italics
const ITALIC_SLANT: f32 = 0.2;
/// Outline stroke of synthesized bold as a fraction of the font size
const BOLD_STROKE: f32 = 0.03;
const EMBEDDED_RESOURCE: &str = "FU";

const TEXT_COLOR: [f32; 3] = [0.17, 0.24, 0.31];
const MUTED_COLOR: [f32; 3] = [0.5, 0.55, 0.55];

/// Typography of one kind of block; spacing in points.
#[derive(Debug, Clone, Copy)]
struct Style {
    font: Font,
    size: f32,
    indent: f32,
    before: f32,
    after: f32,
    color: [f32; 3],
}

const TITLE: Style = Style { font: Font::Bold, size: TITLE_SIZE, indent: 0.0, before: 0.0, after: 4.0, color: TEXT_COLOR };
const SOURCE: Style = Style { font: Font::Italic, size: SMALL_SIZE, indent: 0.0, before: 0.0, after: 8.0, color: MUTED_COLOR };
const MARKER: Style = Style { font: Font::Italic, size: SMALL_SIZE, indent: 0.0, before: 0.0, after: 10.0, color: MUTED_COLOR };
const HEADING: Style = Style { font: Font::Bold, size: HEADING_SIZE, indent: 0.0, before: 14.0, after: 6.0, color: TEXT_COLOR };
const LIST_ITEM: Style = Style { font: Font::Regular, size: BODY_SIZE, indent: LIST_INDENT, before: 2.0, after: 2.0, color: TEXT_COLOR };
const PARAGRAPH: Style = Style { font: Font::Regular, size: BODY_SIZE, indent: 0.0, before: 4.0, after: 6.0, color: TEXT_COLOR };

#[allow(clippy::expect_used)] // Literal pattern
static TEXT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(h[1-3]|p|li|div)(?:\s+class="([^"]*)")?[^>]*>([^<]*)</(?:h[1-3]|p|li|div)>"#)
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    const fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
            Self::Italic => "F3",
        }
    }

    const fn base_font(self) -> &'static str {
        match self {
            Self::Regular => "Helvetica",
            Self::Bold => "Helvetica-Bold",
            Self::Italic => "Helvetica-Oblique",
        }
    }
}

/// One text-bearing element of the structural HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    kind: ElementType,
    text: String,
}

fn parse_blocks(html: &str) -> Vec<Block> {
    TEXT_ELEMENT
        .captures_iter(html)
        .filter_map(|caps| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            let class = caps.get(2).map_or("", |m| m.as_str());
            let text = unescape_html(caps.get(3).map_or("", |m| m.as_str()).trim());
            if text.is_empty() {
                return None;
            }
            let kind = match (tag, class) {
                (_, "page-marker") => ElementType::PageMarker,
                ("h1" | "h2" | "h3", _) | (_, "heading") => ElementType::Heading,
                ("li", _) | (_, "list-item") => ElementType::ListItem,
                _ => ElementType::Paragraph,
            };
            Some(Block { kind, text })
        })
        .collect()
}

/// Map text to WinAnsi bytes.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            '\t' => b' ',
            c => u8::try_from(u32::from(c))
                .ok()
                .filter(|b| *b >= 0x20 && !(0x7F..0xA0).contains(b))
                .unwrap_or(b'?'),
        })
        .collect()
}

/// PDF text string: UTF-16BE with a byte order mark.
fn text_string(text: &str) -> Vec<u8> {
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Word wrap text to fit within `max_width`, measuring with `char_width`.
///
/// A word wider than a whole line is broken between characters.
fn word_wrap(text: &str, max_width: f32, char_width: impl Fn(char) -> f32) -> Vec<String> {
    let space = char_width(' ');
    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let word_width: f32 = word.chars().map(&char_width).sum();
        if !current_line.is_empty() && current_width + space + word_width <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
            current_width += space + word_width;
            continue;
        }
        if !current_line.is_empty() {
            lines.push(std::mem::take(&mut current_line));
        }
        current_width = 0.0;

        if word_width <= max_width {
            current_line.push_str(word);
            current_width = word_width;
            continue;
        }
        for c in word.chars() {
            let width = char_width(c);
            if !current_line.is_empty() && current_width + width > max_width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0.0;
            }
            current_line.push(c);
            current_width += width;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}

/// Standard Helvetica faces, or one embedded Unicode font for every style.
enum Typeface<'a> {
    Standard,
    Embedded(Glyphs<'a>),
}

impl Typeface<'_> {
    fn resource(&self, font: Font) -> &'static str {
        match self {
            Self::Standard => font.resource(),
            Self::Embedded(_) => EMBEDDED_RESOURCE,
        }
    }

    fn char_width(&self, c: char, size: f32) -> f32 {
        match self {
            Self::Standard => size * AVG_CHAR_WIDTH,
            Self::Embedded(glyphs) => glyphs.char_width(c, size),
        }
    }

    fn text(&mut self, text: &str) -> Object {
        match self {
            Self::Standard => Object::String(encode_win_ansi(text), StringFormat::Literal),
            Self::Embedded(glyphs) => Object::String(glyphs.encode(text), StringFormat::Hexadecimal),
        }
    }

    /// Text operations for one line at (`x`, `y`).
    ///
    /// The embedded font has a single face, so bold is drawn with a stroked
    /// outline and italic with a slanted text matrix.
    fn line_ops(
        &mut self,
        text: &str,
        font: Font,
        size: f32,
        x: f32,
        y: f32,
        color: [f32; 3],
    ) -> Vec<Operation> {
        let embedded = matches!(self, Self::Embedded(_));
        let slant = if embedded && font == Font::Italic { ITALIC_SLANT } else { 0.0 };
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("rg", color.iter().map(|c| (*c).into()).collect()),
            Operation::new("Tf", vec![self.resource(font).into(), size.into()]),
        ];
        if embedded {
            let bold = font == Font::Bold;
            ops.push(Operation::new("Tr", vec![Object::Integer(if bold { 2 } else { 0 })]));
            if bold {
                ops.push(Operation::new("RG", color.iter().map(|c| (*c).into()).collect()));
                ops.push(Operation::new("w", vec![(size * BOLD_STROKE).into()]));
            }
        }
        ops.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), slant.into(), 1.into(), x.into(), y.into()],
        ));
        ops.push(Operation::new("Tj", vec![self.text(text)]));
        ops.push(Operation::new("ET", vec![]));
        ops
    }

    /// Font resources for every page, embedding the font program if used.
    fn fonts(&self, doc: &mut Document) -> Dictionary {
        let mut font_dict = Dictionary::new();
        match self {
            Self::Standard => {
                for font in [Font::Regular, Font::Bold, Font::Italic] {
                    let font_id = doc.add_object(Dictionary::from_iter([
                        ("Type", Object::Name(b"Font".to_vec())),
                        ("Subtype", Object::Name(b"Type1".to_vec())),
                        ("BaseFont", Object::Name(font.base_font().as_bytes().to_vec())),
                        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
                    ]));
                    font_dict.set(font.resource(), Object::Reference(font_id));
                }
            }
            Self::Embedded(glyphs) => {
                font_dict.set(EMBEDDED_RESOURCE, Object::Reference(glyphs.embed(doc)));
            }
        }
        font_dict
    }
}

/// Page-by-page content streams built top to bottom.
struct Layout<'a> {
    typeface: Typeface<'a>,
    pages: Vec<Vec<Operation>>,
    y: f32,
    has_body: bool,
}

impl<'a> Layout<'a> {
    fn new(typeface: Typeface<'a>) -> Self {
        Self {
            typeface,
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
            has_body: false,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
        self.has_body = false;
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        // `pages` is never empty
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn line(&mut self, text: &str, style: Style) {
        let ops = self.typeface.line_ops(
            text,
            style.font,
            style.size,
            MARGIN + style.indent,
            self.y,
            style.color,
        );
        self.ops().extend(ops);
    }

    /// Wrapped text block with spacing around it, breaking pages as needed.
    fn block(&mut self, text: &str, style: Style) {
        let line_height = style.size * LINE_SPACING;
        let width = PAGE_WIDTH - 2.0 * MARGIN - style.indent;
        self.y -= style.before;

        let lines = word_wrap(text, width, |c| self.typeface.char_width(c, style.size));
        for line in lines {
            if self.y - line_height < MARGIN + FOOTER_RESERVE {
                self.new_page();
            }
            self.y -= line_height;
            self.line(&line, style);
        }
        self.y -= style.after;
        self.has_body = true;
    }

    fn rule(&mut self, color: [f32; 3]) {
        let y = self.y;
        let ops = self.ops();
        ops.push(Operation::new("RG", color.iter().map(|c| (*c).into()).collect()));
        ops.push(Operation::new("w", vec![0.75_f32.into()]));
        ops.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
        ops.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    fn footer(&mut self, page: usize, text: &str) {
        let ops = self.typeface.line_ops(
            text,
            Font::Regular,
            FOOTER_SIZE,
            MARGIN,
            MARGIN - FOOTER_SIZE,
            MUTED_COLOR,
        );
        self.pages[page].extend(ops);
    }
}

/// Lay out `html` and serialize the resulting PDF.
///
/// Text is drawn with `font` when given, else with the standard Helvetica
/// faces, which only cover WinAnsi and print other characters as `?`.
pub fn render_pdf(
    html: &str,
    source_file_name: &str,
    now: DateTime<Utc>,
    font: Option<&FontData>,
) -> Result<Vec<u8>> {
    let typeface = match font {
        Some(font) => Typeface::Embedded(font.glyphs()?),
        None => Typeface::Standard,
    };
    let mut layout = Layout::new(typeface);

    layout.block("Translated Document", TITLE);
    layout.block(&format!("Original: {source_file_name}"), SOURCE);
    layout.rule(TEXT_COLOR);
    layout.y -= 12.0;
    layout.has_body = false;

    for block in parse_blocks(html) {
        match block.kind {
            ElementType::PageMarker => {
                if layout.has_body {
                    layout.new_page();
                }
                layout.block(&block.text, MARKER);
                // A marker alone does not make the page worth breaking again
                layout.has_body = false;
            }
            ElementType::Heading => layout.block(&block.text, HEADING),
            ElementType::ListItem => layout.block(&block.text, LIST_ITEM),
            ElementType::Paragraph => layout.block(&block.text, PARAGRAPH),
        }
    }

    let total = layout.pages.len();
    let generated = format!("Generated on {}", now.format("%Y-%m-%d %H:%M UTC"));
    for page in 0..total {
        layout.footer(page, &format!("{generated}  |  Page {} of {total}", page + 1));
    }

    build_document(layout, source_file_name)
}

fn build_document(layout: Layout<'_>, title: &str) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_dict = layout.typeface.fonts(&mut doc);
    let resources_id = doc.add_object(Dictionary::from_iter([("Font", Object::Dictionary(font_dict))]));

    let mut kids = Vec::with_capacity(layout.pages.len());
    for operations in layout.pages {
        let content = Content { operations }
            .encode()
            .map_err(|e| Error::Lopdf(format!("Failed to encode page content: {e}")))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    let info_id = doc.add_object(Dictionary::from_iter([
        (
            "Title",
            Object::String(text_string(&format!("Translated: {title}")), StringFormat::Hexadecimal),
        ),
        ("Producer", Object::string_literal("doc-translator")),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::Lopdf(format!("Failed to save PDF: {e}")))?;
    Ok(output)
}

/// Renders with lopdf in-process. Always available.
#[derive(Default)]
pub struct BuiltinRenderer {
    font: Option<Arc<FontData>>,
}

impl BuiltinRenderer {
    /// Use `render.font_path`, or a system font when it is unset or unusable.
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            font: FontData::discover(config.font_path.as_deref()).map(Arc::new),
        }
    }
}

#[async_trait]
impl PdfRenderer for BuiltinRenderer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn render(&self, html: &str, source_file_name: &str) -> Result<Vec<u8>> {
        let html = html.to_string();
        let file_name = source_file_name.to_string();
        let font = self.font.clone();
        let pdf = tokio::task::spawn_blocking(move || {
            render_pdf(&html, &file_name, Utc::now(), font.as_deref())
        })
        .await
        .map_err(|e| Error::RenderFailed(format!("Layout task failed: {e}")))??;

        info!("Rendered {} bytes of PDF with the built-in renderer", pdf.len());
        Ok(pdf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page_count(pdf: &[u8]) -> usize {
        Document::load_mem(pdf).unwrap().get_pages().len()
    }

    /// Operands of every `Tj` on every page.
    fn shown_strings(pdf: &[u8]) -> Vec<Vec<u8>> {
        let doc = Document::load_mem(pdf).unwrap();
        let mut strings = Vec::new();
        for page_id in doc.get_pages().into_values() {
            let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
            for op in content.operations.into_iter().filter(|op| op.operator == "Tj") {
                if let Some(Object::String(bytes, _)) = op.operands.into_iter().next() {
                    strings.push(bytes);
                }
            }
        }
        strings
    }

    #[test]
    fn test_parse_blocks_from_structural_html() {
        let html = "<div class=\"document-content\">\n\
            <div class=\"heading\" data-index=\"0\">INTRO</div>\n\
            <div class=\"paragraph\" data-index=\"1\">Fish &amp; chips</div>\n\
            <div class=\"page-marker\" data-index=\"2\">--- Page 2 ---</div>\n\
            </div>";
        let blocks = parse_blocks(html);
        assert_eq!(
            blocks,
            vec![
                Block { kind: ElementType::Heading, text: "INTRO".to_string() },
                Block { kind: ElementType::Paragraph, text: "Fish & chips".to_string() },
                Block { kind: ElementType::PageMarker, text: "--- Page 2 ---".to_string() },
            ]
        );
    }

    #[test]
    fn test_parse_blocks_from_word_html() {
        let html = "<div class=\"document-content\"><h2>Title</h2><p>Body</p><ul><li>Item</li></ul></div>";
        let kinds: Vec<_> = parse_blocks(html).into_iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![ElementType::Heading, ElementType::Paragraph, ElementType::ListItem]);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Café €5"), vec![b'C', b'a', b'f', 0xE9, b' ', 0x80, b'5']);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_word_wrap_basic() {
        let lines = word_wrap("Hello world this is a test", 10.0, |_| 1.0);
        assert_eq!(lines, vec!["Hello", "world this", "is a test"]);
        assert!(word_wrap("", 10.0, |_| 1.0).is_empty());
    }

    #[test]
    fn test_word_wrap_breaks_overlong_words() {
        let word = "x".repeat(25);
        let lines = word_wrap(&format!("ab {word} cd"), 10.0, |_| 1.0);
        assert_eq!(lines, vec!["ab", "xxxxxxxxxx", "xxxxxxxxxx", "xxxxx cd"]);
    }

    #[test]
    fn test_overlong_word_stays_inside_margins() {
        let html = format!("<p>{}</p>", "x".repeat(500));
        let pdf = render_pdf(&html, "a.txt", Utc::now(), None).unwrap();

        let max_chars = (PAGE_WIDTH - 2.0 * MARGIN) / (BODY_SIZE * AVG_CHAR_WIDTH);
        let body: Vec<_> = shown_strings(&pdf)
            .into_iter()
            .filter(|s| s.iter().all(|b| *b == b'x'))
            .collect();
        assert_eq!(body.iter().map(Vec::len).sum::<usize>(), 500);
        #[allow(clippy::cast_precision_loss)]
        let fits = body.iter().all(|s| s.len() as f32 <= max_chars);
        assert!(fits);
    }

    #[test]
    fn test_non_latin_text_uses_embedded_font() {
        let Some(font) = FontData::discover(None) else {
            return;
        };
        let html = "<div class=\"heading\" data-index=\"0\">Введение</div>\
            <div class=\"paragraph\" data-index=\"1\">Привет, мир. Καλημέρα.</div>";
        let pdf = render_pdf(html, "отчёт.txt", Utc::now(), Some(&font)).unwrap();

        let doc = Document::load_mem(&pdf).unwrap();
        let type0 = doc.objects.values().any(|obj| {
            obj.as_dict()
                .and_then(|d| d.get(b"Subtype"))
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"Type0")
        });
        assert!(type0);

        let strings = shown_strings(&pdf);
        assert!(!strings.is_empty());
        for glyphs in strings {
            assert_eq!(glyphs.len() % 2, 0);
            assert!(glyphs.chunks(2).all(|g| g != [0, 0]), "missing glyph");
        }
    }

    #[test]
    fn test_page_markers_start_new_pages() {
        let html = "<div class=\"page-marker\" data-index=\"0\">--- Page 1 ---</div>\
            <div class=\"paragraph\" data-index=\"1\">First page text.</div>\
            <div class=\"page-marker\" data-index=\"2\">--- Page 2 ---</div>\
            <div class=\"paragraph\" data-index=\"3\">Second page text.</div>";
        let pdf = render_pdf(html, "report.pdf", Utc::now(), None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(page_count(&pdf), 2);
    }

    #[test]
    fn test_leading_page_marker_does_not_leave_blank_page() {
        let html = "<div class=\"page-marker\" data-index=\"0\">--- Page 1 ---</div>\
            <div class=\"paragraph\" data-index=\"1\">Text.</div>";
        let pdf = render_pdf(html, "a.pdf", Utc::now(), None).unwrap();
        assert_eq!(page_count(&pdf), 1);
    }

    #[test]
    fn test_long_text_overflows_onto_more_pages() {
        let paragraph = format!("<p>{}</p>", "lorem ipsum dolor sit amet ".repeat(40));
        let html = paragraph.repeat(20);
        let pdf = render_pdf(&html, "long.txt", Utc::now(), None).unwrap();
        assert!(page_count(&pdf) > 1);
    }

    #[tokio::test]
    async fn test_renderer_trait() {
        let renderer = BuiltinRenderer::default();
        let pdf = renderer.render("<p>Hello</p>", "a.txt").await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(renderer.name(), "builtin");
    }
}
