use askama::Template;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Elements the document body may contain; everything else is unwrapped.
const ALLOWED_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "ul", "ol", "li", "span", "br", "strong", "em", "b", "i",
];

/// Elements dropped together with their content.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "iframe", "frame", "frameset", "object", "embed", "svg", "math",
    "template", "noscript", "textarea", "title", "head", "video", "audio", "canvas",
];

#[allow(clippy::expect_used)] // Literal pattern
static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)([^>]*)>").expect("valid regex")
});

#[allow(clippy::expect_used)] // Literal pattern
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9-]*)\s*=\s*"([^"]*)""#).expect("valid regex")
});

fn safe_attribute(name: &str, value: &str) -> bool {
    matches!(name, "class" | "data-index")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

/// Rebuild `html` from allowed elements and attributes only.
///
/// The result never carries scripts, event handlers, styles or anything that
/// makes the browser load another resource.
pub fn sanitize_body(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut skipping: Option<String> = None;
    let mut last = 0;

    for caps in MARKUP.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        if skipping.is_none() {
            push_text(&mut out, &html[last..whole.start()]);
        }
        last = whole.end();

        // Comments have no name group
        let Some(name) = caps.get(2) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let attributes = caps.get(3).map_or("", |m| m.as_str());

        if let Some(dropped) = &skipping {
            if closing && *dropped == name {
                skipping = None;
            }
            continue;
        }
        if DROPPED_TAGS.contains(&name.as_str()) {
            if !closing && !attributes.trim_end().ends_with('/') {
                skipping = Some(name);
            }
            continue;
        }
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        out.push('<');
        if closing {
            out.push('/');
            out.push_str(&name);
        } else {
            out.push_str(&name);
            for attr in ATTRIBUTE.captures_iter(attributes) {
                let (_, [attr_name, value]) = attr.extract();
                let attr_name = attr_name.to_ascii_lowercase();
                if safe_attribute(&attr_name, value) {
                    let _ = write!(out, " {attr_name}=\"{value}\"");
                }
            }
        }
        out.push('>');
    }

    if skipping.is_none() {
        push_text(&mut out, &html[last..]);
    }
    out
}

/// Printable HTML page wrapping a reconciled document body.
#[derive(Template)]
#[template(path = "document.html")]
pub struct DocumentPage<'a> {
    /// Source file name, escaped by the template
    pub file_name: &'a str,
    /// Sanitized structural HTML, inserted verbatim
    pub body: String,
    pub generated_at: String,
}

impl<'a> DocumentPage<'a> {
    pub fn new(body: &str, file_name: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            file_name,
            body: sanitize_body(body),
            generated_at: now.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }

    pub fn to_html(&self) -> Result<String> {
        self.render()
            .map_err(|e| Error::RenderFailed(format!("Failed to render document template: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_page_escapes_file_name_but_not_body() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let page = DocumentPage::new(
            "<div class=\"paragraph\" data-index=\"0\">Hello</div>",
            "<evil>.txt",
            now,
        );
        let html = page.to_html().unwrap();

        assert!(html.contains("<div class=\"paragraph\" data-index=\"0\">Hello</div>"));
        assert!(html.contains("Original: &#60;evil&#62;.txt") || html.contains("Original: &lt;evil&gt;.txt"));
        assert!(html.contains("Generated on 2026-03-01 09:30 UTC"));
        assert!(html.contains("size: A4"));
    }

    #[test]
    fn test_structural_html_survives_sanitizing() {
        let html = "<div class=\"document-content\">\n\
            <h2>Title</h2><ul><li>One &amp; two</li></ul><br/>\n\
            <div class=\"page-marker\" data-index=\"3\">--- Page 2 ---</div>\n\
            </div>";
        assert_eq!(
            sanitize_body(html),
            "<div class=\"document-content\">\n\
            <h2>Title</h2><ul><li>One &amp; two</li></ul><br>\n\
            <div class=\"page-marker\" data-index=\"3\">--- Page 2 ---</div>\n\
            </div>"
        );
    }

    #[test]
    fn test_active_and_external_content_is_removed() {
        let html = "<div class=\"paragraph\" data-index=\"0\">Kept text\
            <iframe src=\"file:///etc/passwd\"></iframe>\
            <img src=\"http://169.254.169.254/latest/meta-data\">\
            <script>fetch('http://attacker.example')</script>\
            <SCRIPT>alert(1)</SCRIPT>\
            <a href=\"javascript:alert(1)\">anchor text</a>\
            <link rel=\"stylesheet\" href=\"http://attacker.example/a.css\">\
            <style>@import url(http://attacker.example)</style>\
            <!-- <img src=x> --></div>\
            <p style=\"background:url(http://attacker.example)\" onclick=\"x()\" class=\"a\">More</p>";
        let clean = sanitize_body(html);

        for banned in ["iframe", "img", "script", "SCRIPT", "href", "link", "style", "onclick", "http", "file:", "alert", "fetch"] {
            assert!(!clean.contains(banned), "{banned} left in {clean}");
        }
        assert!(clean.contains("Kept text"));
        assert!(clean.contains("anchor text"));
        assert!(clean.contains("<p class=\"a\">More</p>"));
    }

    #[test]
    fn test_unterminated_markup_is_escaped() {
        let clean = sanitize_body("<p>a < b</p><script src=x");
        assert_eq!(clean, "<p>a &lt; b</p>&lt;script src=x");
    }

    #[test]
    fn test_attribute_values_are_restricted() {
        let clean = sanitize_body("<div class=\"x\" data-index=\"1&quot;\"><span class='y'>t</span></div>");
        assert_eq!(clean, "<div class=\"x\"><span>t</span></div>");
    }
}
