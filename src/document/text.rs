//! Text model shared by both engines
//!
//! Extraction walks the XML token stream and collects the character data of
//! text elements. Replacement only ever touches the content between a text
//! element's start and end tags; tag names and attributes are left alone.

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::io::BufRead;

use super::models::DocumentKind;
use crate::error::Result;

// Opening tag, raw (escaped) content, closing tag. The opening tag must be the
// bare element or carry attributes, so `<w:tab/>` and `<w:tbl>` never match.
static WORD_TEXT_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(<w:t(?:\s[^>]*)?>)([^<]*)(</w:t>)").unwrap());
static SLIDE_TEXT_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(<a:t(?:\s[^>]*)?>)([^<]*)(</a:t>)").unwrap());

fn text_node_pattern(kind: DocumentKind) -> &'static Regex {
    match kind {
        DocumentKind::Word => &WORD_TEXT_NODE,
        DocumentKind::Presentation => &SLIDE_TEXT_NODE,
    }
}

/// Escape the XML-significant characters `<`, `>`, `&`, `"` and `'`.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    escape(text)
}

/// Replace every occurrence of `old` in decoded text.
///
/// Returns `None` when `old` does not occur, otherwise the new text and the
/// number of occurrences replaced.
pub(crate) fn replace_decoded(text: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let count = text.matches(old).count();
    if count == 0 {
        return None;
    }
    Some((text.replace(old, new), count))
}

/// Replace `old` with `new` inside every text node of a part's XML.
///
/// Text node content is decoded before matching, so `old` is compared against
/// what a reader of the document sees. A rewritten node is re-escaped as a
/// whole. Returns the (possibly unchanged) XML and the occurrence count.
pub fn replace_in_xml<'a>(
    xml: &'a str,
    kind: DocumentKind,
    old: &str,
    new: &str,
) -> (Cow<'a, str>, usize) {
    let mut total = 0usize;
    let rewritten = text_node_pattern(kind).replace_all(xml, |caps: &Captures| {
        let raw = &caps[2];
        let decoded = match unescape(raw) {
            Ok(decoded) => decoded,
            // Undecodable content is left exactly as found
            Err(_) => return caps[0].to_string(),
        };
        match replace_decoded(&decoded, old, new) {
            Some((replaced, count)) => {
                total += count;
                format!("{}{}{}", &caps[1], escape_xml(&replaced), &caps[3])
            }
            None => caps[0].to_string(),
        }
    });

    if total == 0 {
        (Cow::Borrowed(xml), 0)
    } else {
        (Cow::Owned(rewritten.into_owned()), total)
    }
}

/// Text collected from one XML part.
#[derive(Debug, Default, Clone)]
pub(crate) struct CollectedText {
    /// Concatenated text of each non-empty paragraph, in document order
    pub(crate) paragraphs: Vec<String>,
    /// Each non-empty text element on its own
    pub(crate) runs: Vec<String>,
}

/// Walk a part's token stream and collect text-element content.
pub(crate) fn collect_text<R: BufRead>(input: R, kind: DocumentKind) -> Result<CollectedText> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);

    let text_element = kind.text_element();
    let paragraph_element = kind.paragraph_element();

    let mut collected = CollectedText::default();
    // Paragraphs nest (text boxes inside a paragraph), so keep a stack
    let mut open_paragraphs: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut current_run = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == paragraph_element => {
                open_paragraphs.push(String::new());
            }
            Event::End(ref e) if e.name().as_ref() == paragraph_element => {
                if let Some(paragraph) = open_paragraphs.pop() {
                    if !paragraph.is_empty() {
                        collected.paragraphs.push(paragraph);
                    }
                }
            }
            Event::Start(ref e) if e.name().as_ref() == text_element => {
                in_text = true;
                current_run.clear();
            }
            Event::End(ref e) if e.name().as_ref() == text_element => {
                in_text = false;
                if !current_run.is_empty() {
                    if let Some(paragraph) = open_paragraphs.last_mut() {
                        paragraph.push_str(&current_run);
                    }
                    collected.runs.push(std::mem::take(&mut current_run));
                }
            }
            Event::Text(ref e) if in_text => {
                current_run.push_str(&e.unescape()?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t>Version 1.0</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Status: </w:t></w:r><w:r><w:t>Draft</w:t></w:r></w:p><w:p w:rsidR="t"><w:r><w:tab/><w:t>Year: 2023</w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn test_collect_paragraphs() {
        let collected = collect_text(BODY.as_bytes(), DocumentKind::Word).unwrap();
        assert_eq!(
            collected.paragraphs,
            vec!["Version 1.0", "Status: Draft", "Year: 2023"]
        );
        assert_eq!(collected.runs.len(), 4);
    }

    #[test]
    fn test_collect_decodes_entities_and_multibyte() {
        let xml = r#"<w:p><w:r><w:t>R&amp;D &lt;team&gt; 안녕하세요 😀</w:t></w:r></w:p>"#;
        let collected = collect_text(xml.as_bytes(), DocumentKind::Word).unwrap();
        assert_eq!(collected.paragraphs, vec!["R&D <team> 안녕하세요 😀"]);
    }

    #[test]
    fn test_replace_counts_occurrences() {
        let (xml, count) = replace_in_xml(BODY, DocumentKind::Word, "Draft", "Final");
        assert_eq!(count, 1);
        assert!(xml.contains("<w:t>Final</w:t>"));

        let (_, count) = replace_in_xml(
            "<w:p><w:r><w:t>a a a</w:t></w:r><w:r><w:t>a</w:t></w:r></w:p>",
            DocumentKind::Word,
            "a",
            "b",
        );
        assert_eq!(count, 4);
    }

    #[test]
    fn test_replace_missing_text_borrows_input() {
        let (xml, count) = replace_in_xml(BODY, DocumentKind::Word, "absent", "x");
        assert_eq!(count, 0);
        assert!(matches!(xml, Cow::Borrowed(_)));
    }

    #[test]
    fn test_replace_never_touches_markup() {
        // "w:t" and "preserve" only appear in tag names and attributes here
        let (xml, count) = replace_in_xml(BODY, DocumentKind::Word, "preserve", "oops");
        assert_eq!(count, 0);
        assert_eq!(xml, BODY);

        let (_, count) = replace_in_xml(BODY, DocumentKind::Word, "rsidR", "x");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_replacement_is_escaped() {
        let (xml, count) = replace_in_xml(
            BODY,
            DocumentKind::Word,
            "Draft",
            r#"</w:t><w:t>"x" & 'y'"#,
        );
        assert_eq!(count, 1);
        assert!(xml.contains("&lt;/w:t&gt;&lt;w:t&gt;&quot;x&quot; &amp; &apos;y&apos;"));

        let collected = collect_text(xml.as_bytes(), DocumentKind::Word).unwrap();
        assert_eq!(collected.runs.len(), 4);
        assert_eq!(collected.paragraphs[1], r#"Status: </w:t><w:t>"x" & 'y'"#);
    }

    #[test]
    fn test_match_against_decoded_text() {
        let xml = "<a:p><a:r><a:t>Q&amp;A session</a:t></a:r></a:p>";
        let (xml, count) = replace_in_xml(xml, DocumentKind::Presentation, "Q&A", "FAQ");
        assert_eq!(count, 1);
        assert_eq!(xml, "<a:p><a:r><a:t>FAQ session</a:t></a:r></a:p>");
    }

    #[test]
    fn test_kind_scopes_text_element() {
        let xml = "<a:p><a:r><a:t>Hello</a:t></a:r></a:p>";
        let (_, count) = replace_in_xml(xml, DocumentKind::Word, "Hello", "Bye");
        assert_eq!(count, 0);
        let (_, count) = replace_in_xml(xml, DocumentKind::Presentation, "Hello", "Bye");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_replace_decoded_none_when_absent() {
        assert_eq!(replace_decoded("abc", "x", "y"), None);
        assert_eq!(
            replace_decoded("2023-2023", "2023", "2024"),
            Some(("2024-2024".to_string(), 2))
        );
    }
}
