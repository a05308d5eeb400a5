//! EPUB container parsing and per-document HTML-to-text extraction.
//!
//! Chapter text is recovered from each spine document in reading order:
//! script/style/navigation markup is stripped via `lol_html`, drop-cap
//! initials are folded back into their paragraph, and the remaining text
//! is joined on paragraph boundaries.

use crate::error::EpubError;
use crate::text::normalize_extracted_text;
use epub::doc::EpubDoc;
use lol_html::{element, text, HtmlRewriter, Settings};
use regex::Regex;
use std::io::Cursor;
use std::sync::OnceLock;

pub struct ExtractedChapter {
    pub title: String,
    pub text: String,
}

/// Parse an in-memory EPUB and extract one `ExtractedChapter` per spine
/// item, in reading order. Does not apply the metadata filter; callers
/// decide what to keep.
pub fn extract_chapters(epub_bytes: &[u8]) -> Result<Vec<ExtractedChapter>, EpubError> {
    let cursor = Cursor::new(epub_bytes.to_vec());
    let mut doc = EpubDoc::from_reader(cursor).map_err(|e| EpubError::Parse(e.to_string()))?;

    let mut chapters = Vec::new();
    let spine_len = doc.spine.len();

    for _ in 0..spine_len {
        let path = doc.get_current_path().unwrap_or_default();
        if let Some((content, _mime)) = doc.get_current_str() {
            let title = derive_title(&path);
            let extracted_html = strip_html_to_text(&content);
            let normalized = normalize_extracted_text(&extracted_html);
            chapters.push(ExtractedChapter { title, text: normalized });
        }

        if !doc.go_next() {
            break;
        }
    }

    Ok(chapters)
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w]+").unwrap())
}

/// Derive a display title from a spine item's path: basename, extension
/// stripped, non-word runs replaced with underscores.
fn derive_title(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chapter");
    non_word_re().replace_all(stem, "_").trim_matches('_').to_string()
}

/// Strip script/style/navigation markup from one XHTML document and
/// reassemble paragraph text, inserting a blank-line separator after each
/// block element so the chunker's paragraph split keeps working.
fn strip_html_to_text(html: &str) -> String {
    let current = std::cell::RefCell::new(String::new());

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("script, style, nav, head", |el| {
                        el.remove();
                        Ok(())
                    }),
                    element!("p, div, h1, h2, h3, h4, h5, h6, br", |el| {
                        el.on_end_tag(|_end| Ok(()))?;
                        current.borrow_mut().push_str("\n\n");
                        Ok(())
                    }),
                    text!("*", |chunk| {
                        current.borrow_mut().push_str(chunk.as_str());
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |_: &[u8]| {},
        );

        // lol_html streams; feed the whole document at once.
        let _ = rewriter.write(html.as_bytes());
        let _ = rewriter.end();
    }

    current.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_derived_from_basename_without_extension() {
        let path = std::path::Path::new("OEBPS/Text/Chapter-One.xhtml");
        assert_eq!(derive_title(path), "Chapter_One");
    }

    #[test]
    fn script_and_style_tags_are_stripped() {
        let html = "<html><body><style>body{color:red}</style><p>Hello world</p><script>evil()</script></body></html>";
        let text = strip_html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(!text.contains("evil()"));
        assert!(!text.contains("color:red"));
    }
}
