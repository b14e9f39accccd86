//! Substituting translated lines into the source document's HTML.
//!
//! Source and translated text are paired line by line (non-blank lines only).
//! Each pair replaces the escaped source line in the HTML with the escaped
//! translation. The scan only moves forward, so text inserted by an earlier
//! substitution is never matched again and repeated lines are replaced in
//! document order. Lines beyond the shorter of the two texts are left as is.

use tracing::debug;

use crate::util::{escape_html, non_blank_lines};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub html: String,
    /// Pairs whose source line was found and replaced
    pub replaced: usize,
    /// Pairs whose source line was not found after the cursor
    pub missed: usize,
}

/// Whether byte offset `pos` lies in text content rather than inside a tag.
fn in_text_node(html: &str, pos: usize) -> bool {
    html[..pos].rfind(['<', '>']).is_none_or(|i| html.as_bytes()[i] == b'>')
}

/// Find `needle` as the full content of an element at or after `from`,
/// falling back to an occurrence inside text content. Tag names and
/// attribute values are never matched. Returns the byte offset of the needle.
///
/// `needle` is escaped, so it cannot contain `<` or `>` and never spans a tag.
fn find_forward(html: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = &html[from..];
    let element = format!(">{needle}<");
    if let Some(pos) = haystack.find(&element) {
        return Some(from + pos + 1);
    }
    haystack
        .match_indices(needle)
        .map(|(pos, _)| from + pos)
        .find(|&pos| in_text_node(html, pos))
}

pub fn reconcile_html(html: &str, source_text: &str, translated_text: &str) -> Reconciled {
    let mut out = html.to_string();
    let mut cursor = 0;
    let mut replaced = 0;
    let mut missed = 0;

    for (source, translated) in non_blank_lines(source_text).zip(non_blank_lines(translated_text)) {
        let source = escape_html(source.trim());
        let translated = escape_html(translated.trim());
        if source.is_empty() {
            continue;
        }

        let Some(pos) = find_forward(&out, &source, cursor) else {
            missed += 1;
            continue;
        };

        if source == translated {
            cursor = pos + source.len();
        } else {
            out.replace_range(pos..pos + source.len(), &translated);
            cursor = pos + translated.len();
            replaced += 1;
        }
    }

    debug!("Reconciled HTML: {} lines replaced, {} not found", replaced, missed);
    Reconciled {
        html: out,
        replaced,
        missed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::structure_text;

    #[test]
    fn test_replaces_lines_in_order() {
        let source = "HOLA\nBuenos días.\n- uno";
        let translated = "HELLO\nGood morning.\n- one";
        let (_, html) = structure_text(source);

        let result = reconcile_html(&html, source, translated);
        assert_eq!(result.replaced, 3);
        assert!(result.html.contains(">HELLO</div>"));
        assert!(result.html.contains(">Good morning.</div>"));
        assert!(result.html.contains(">- one</div>"));
        assert!(!result.html.contains("Buenos"));
        assert!(result.html.contains("class=\"heading\""));
    }

    #[test]
    fn test_substituted_text_is_not_matched_again() {
        // The first translation equals the second source line
        let html = "<p>a</p><p>b</p>";
        let result = reconcile_html(html, "a\nb", "b\nc");
        assert_eq!(result.html, "<p>b</p><p>c</p>");
    }

    #[test]
    fn test_repeated_lines_follow_document_order() {
        let html = "<p>Yes</p><p>No</p><p>Yes</p>";
        let result = reconcile_html(html, "Yes\nNo\nYes", "Sí\nNo\nSí");
        assert_eq!(result.html, "<p>Sí</p><p>No</p><p>Sí</p>");
        assert_eq!(result.replaced, 2);
    }

    #[test]
    fn test_only_overlapping_prefix_is_reconciled() {
        let html = "<p>one</p><p>two</p><p>three</p>";
        let result = reconcile_html(html, "one\ntwo\nthree", "uno\ndos");
        assert_eq!(result.html, "<p>uno</p><p>dos</p><p>three</p>");
    }

    #[test]
    fn test_escaping_on_both_sides() {
        let (_, html) = structure_text("Fish & chips");
        let result = reconcile_html(&html, "Fish & chips", "Pescado <y> patatas");
        assert!(result.html.contains("Pescado &lt;y&gt; patatas"));
        assert!(!result.html.contains("<y>"));
    }

    #[test]
    fn test_does_not_rewrite_markup() {
        // A line equal to a class name must match element content, not the attribute
        let (_, html) = structure_text("paragraph");
        let result = reconcile_html(&html, "paragraph", "párrafo");
        assert!(result.html.contains("class=\"paragraph\""));
        assert!(result.html.contains(">párrafo</div>"));
    }

    #[test]
    fn test_partial_match_skips_attributes_and_tag_names() {
        let html = "<div class=\"paragraph\" data-index=\"0\">Intro paragraph here</div>";
        let result = reconcile_html(html, "paragraph", "Absatz");
        assert_eq!(
            result.html,
            "<div class=\"paragraph\" data-index=\"0\">Intro Absatz here</div>"
        );

        let html = "<div class=\"heading\">Other</div>";
        let result = reconcile_html(html, "div", "section");
        assert_eq!(result.html, html);
        assert_eq!(result.missed, 1);
    }

    #[test]
    fn test_divergent_line_counts_leave_unmatched_lines() {
        // Translation merged two lines into one: the pairing drifts but nothing panics
        let html = "<p>A.</p><p>B.</p><p>C.</p>";
        let result = reconcile_html(html, "A.\nB.\nC.", "X. Y.\nZ.");
        assert_eq!(result.html, "<p>X. Y.</p><p>Z.</p><p>C.</p>");
        assert_eq!(result.missed, 0);
    }

    #[test]
    fn test_missing_source_line_is_counted() {
        let result = reconcile_html("<p>a</p>", "zzz\na", "yyy\nb");
        assert_eq!(result.missed, 1);
        assert_eq!(result.html, "<p>b</p>");
    }
}
