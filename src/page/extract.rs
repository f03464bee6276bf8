//! Whole-page text extraction
//!
//! Three strategies, tried in order of fidelity: paragraph blocks, then a
//! recognizable main-content container, then the whole body with chrome
//! stripped. The first strategy that yields enough text wins, and the reply
//! records which one it was.

use crate::page::document::{collapse_whitespace, Document};
use crate::page::scan::MIN_UNIT_CHARS;
use crate::{ReadifyError, Result};
use log::{debug, info};

/// Extracted text is capped at this many codepoints
pub const MAX_EXTRACT_CHARS: usize = 5000;
/// Selections are capped shorter and marked with an ellipsis
pub const MAX_SELECTION_CHARS: usize = 2000;

/// Paragraph extraction only counts if the combined text beats this
const MIN_PARAGRAPH_TOTAL: usize = 50;

/// Text plus the name of the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub source: &'static str,
}

/// Normalize extracted text: collapse whitespace and cap the length
pub fn clean_text(text: &str) -> String {
    let cleaned = collapse_whitespace(text);
    if cleaned.chars().count() > MAX_EXTRACT_CHARS {
        cleaned.chars().take(MAX_EXTRACT_CHARS).collect()
    } else {
        cleaned
    }
}

/// Cap a user selection, marking truncation with an ellipsis
pub fn clean_selection(text: &str) -> String {
    let cleaned = collapse_whitespace(text);
    if cleaned.chars().count() > MAX_SELECTION_CHARS {
        let mut capped: String = cleaned.chars().take(MAX_SELECTION_CHARS).collect();
        capped.push_str("...");
        capped
    } else {
        cleaned
    }
}

/// Extract the readable text of a page
pub fn extract_page_text(doc: &Document) -> Result<Extracted> {
    // Strategy 1: paragraph blocks
    let paragraphs: Vec<&str> = doc
        .blocks()
        .iter()
        .filter(|b| b.text.chars().count() > MIN_UNIT_CHARS)
        .map(|b| b.text.as_str())
        .collect();
    let joined = paragraphs.join("\n\n");
    if joined.chars().count() > MIN_PARAGRAPH_TOTAL {
        debug!("Extracted {} paragraphs", paragraphs.len());
        return Ok(Extracted {
            text: clean_text(&joined),
            source: "paragraphs",
        });
    }

    // Strategy 2: a main-content container
    if let Some(main) = doc.main_text() {
        debug!("Extracted main-content container");
        return Ok(Extracted {
            text: clean_text(main),
            source: "main-content",
        });
    }

    // Strategy 3: whole body minus scripts and chrome
    let body = clean_text(doc.body_text());
    if body.is_empty() {
        info!("Page has no readable text");
        return Err(ReadifyError::InvalidInput(
            "No readable text found on page".to_string(),
        ));
    }
    debug!("Extracted whole-body text ({} chars)", body.chars().count());
    Ok(Extracted {
        text: body,
        source: "all-text",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_win_when_substantial() {
        let doc = Document::parse(
            "<body><p>The first real paragraph of the page.</p><p>And here is the second paragraph.</p></body>",
        )
        .unwrap();
        let out = extract_page_text(&doc).unwrap();
        assert_eq!(out.source, "paragraphs");
        assert!(out.text.contains("first real paragraph"));
        assert!(out.text.contains("\n\n") || out.text.contains("second"));
    }

    #[test]
    fn falls_back_to_main_content() {
        let filler = "content sentence ".repeat(10);
        let html = format!("<body><p>short</p><article>{}</article></body>", filler);
        let doc = Document::parse(&html).unwrap();
        let out = extract_page_text(&doc).unwrap();
        assert_eq!(out.source, "main-content");
    }

    #[test]
    fn falls_back_to_all_text() {
        let doc = Document::parse(
            "<body><div>Loose text sitting in a div, no paragraphs anywhere.</div></body>",
        )
        .unwrap();
        let out = extract_page_text(&doc).unwrap();
        assert_eq!(out.source, "all-text");
        assert!(out.text.contains("Loose text"));
    }

    #[test]
    fn empty_page_is_an_error() {
        let doc = Document::parse("<body><script>only()</script></body>").unwrap();
        assert!(extract_page_text(&doc).is_err());
    }

    #[test]
    fn clean_text_caps_length() {
        let long = "word ".repeat(2000);
        let cleaned = clean_text(&long);
        assert_eq!(cleaned.chars().count(), MAX_EXTRACT_CHARS);
    }

    #[test]
    fn selection_gets_ellipsis_when_capped() {
        let long = "x".repeat(3000);
        let capped = clean_selection(&long);
        assert!(capped.ends_with("..."));
        assert_eq!(capped.chars().count(), MAX_SELECTION_CHARS + 3);

        let short = clean_selection("just a selection");
        assert_eq!(short, "just a selection");
    }
}
