//! Lenient HTML document model
//!
//! A single streaming pass over the page HTML collects everything the page
//! context needs: the ordered paragraph and list blocks the scanner turns
//! into speakable units, the text of the first recognizable main-content
//! container, and the whole-body text with scripts and navigation chrome
//! removed. Real pages are rarely well-formed, so the parse tolerates
//! unbalanced tags and never fails on structure; it only reports hard
//! tokenizer errors.

use crate::Result;
use log::{debug, warn};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use regex::Regex;

/// Containers whose text counts as "main content" (strategy 2 of page
/// extraction). Matched by tag name, or by id/class token for the dotted and
/// hashed entries.
static MAIN_CONTENT_SELECTORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "main",
        "article",
        ".content",
        ".main-content",
        ".post-content",
        ".entry-content",
        "#content",
        "#main",
        ".article-content",
    ]
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Elements whose subtrees are never text
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Page chrome excluded from whole-body extraction
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

/// Elements that close themselves even when written as start tags
const VOID_TAGS: &[&str] = &[
    "br", "img", "hr", "meta", "link", "input", "source", "wbr", "area", "base", "col", "embed",
    "track",
];

/// Collapse runs of whitespace into single spaces and trim
pub(crate) fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Kind of speakable block found in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    OrderedList,
    UnorderedList,
}

/// One speakable block in document order
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    /// Whitespace-normalized text. For lists this is the serialized item
    /// lines ("1. ..." or "\u{2022} ...") joined by newlines.
    pub text: String,
}

/// Parsed page content
#[derive(Debug, Clone, Default)]
pub struct Document {
    blocks: Vec<Block>,
    main_text: Option<String>,
    body_text: String,
}

/// In-progress list capture during the parse
struct ListCapture {
    ordered: bool,
    items: Vec<String>,
    depth: usize,
}

/// In-progress main-content capture
struct MainCapture {
    depth: usize,
    text: String,
}

impl Document {
    /// Parse page HTML into the document model
    pub fn parse(html: &str) -> Result<Self> {
        let mut reader = Reader::from_str(html);
        // Real pages close tags sloppily; do not treat that as fatal
        reader.config_mut().check_end_names = false;

        let mut doc = Document::default();
        let mut stack: Vec<String> = Vec::new();
        let mut skip_depth = 0usize;
        let mut chrome_depth = 0usize;
        let mut paragraph: Option<String> = None;
        let mut list: Option<ListCapture> = None;
        let mut in_item = false;
        let mut main: Option<MainCapture> = None;
        let mut main_done = false;
        let mut body = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let tag = tag_name(e.name());
                    if SKIP_TAGS.contains(&tag.as_str()) {
                        skip_depth += 1;
                        continue;
                    }
                    if skip_depth > 0 {
                        continue;
                    }
                    if VOID_TAGS.contains(&tag.as_str()) {
                        // Treated as empty even when the page omits the slash
                        if tag == "br" {
                            push_separator(&mut body, &mut paragraph, &mut main);
                        }
                        continue;
                    }
                    if CHROME_TAGS.contains(&tag.as_str()) {
                        chrome_depth += 1;
                    }

                    match tag.as_str() {
                        "p" => {
                            // A new paragraph implicitly closes an unclosed one
                            if let Some(text) = paragraph.take() {
                                doc.finish_paragraph(text);
                            }
                            paragraph = Some(String::new());
                        }
                        "ol" | "ul" => {
                            match list.as_mut() {
                                // Nested lists flatten into the outermost one
                                Some(capture) => capture.depth += 1,
                                None => {
                                    list = Some(ListCapture {
                                        ordered: tag == "ol",
                                        items: Vec::new(),
                                        depth: 1,
                                    })
                                }
                            }
                        }
                        "li" => {
                            if let Some(capture) = list.as_mut() {
                                capture.items.push(String::new());
                                in_item = true;
                            }
                        }
                        _ => {}
                    }

                    if !main_done && main.is_none() && matches_main_content(&tag, &e) {
                        debug!("Main-content container matched: <{}>", tag);
                        main = Some(MainCapture {
                            depth: stack.len(),
                            text: String::new(),
                        });
                    }

                    stack.push(tag);
                }
                Ok(Event::Empty(e)) => {
                    let tag = tag_name(e.name());
                    if skip_depth > 0 {
                        continue;
                    }
                    if tag == "br" {
                        push_separator(&mut body, &mut paragraph, &mut main);
                    }
                }
                Ok(Event::End(e)) => {
                    let tag = tag_name(e.name());
                    if SKIP_TAGS.contains(&tag.as_str()) {
                        skip_depth = skip_depth.saturating_sub(1);
                        continue;
                    }
                    if skip_depth > 0 {
                        continue;
                    }
                    if CHROME_TAGS.contains(&tag.as_str()) {
                        chrome_depth = chrome_depth.saturating_sub(1);
                    }

                    match tag.as_str() {
                        "p" => {
                            if let Some(text) = paragraph.take() {
                                doc.finish_paragraph(text);
                            }
                        }
                        "ol" | "ul" => {
                            let finished = match list.as_mut() {
                                Some(capture) => {
                                    capture.depth -= 1;
                                    capture.depth == 0
                                }
                                None => false,
                            };
                            if finished {
                                if let Some(capture) = list.take() {
                                    in_item = false;
                                    doc.finish_list(capture);
                                }
                            }
                        }
                        "li" => in_item = false,
                        _ => {}
                    }

                    // Stray end tags are tolerated: pop only on a match
                    if stack.last().map(String::as_str) == Some(tag.as_str()) {
                        stack.pop();
                    }

                    let main_closed = main
                        .as_ref()
                        .map(|capture| stack.len() <= capture.depth)
                        .unwrap_or(false);
                    if main_closed {
                        if let Some(capture) = main.take() {
                            let text = collapse_whitespace(&capture.text);
                            if text.chars().count() > 100 {
                                doc.main_text = Some(text);
                                main_done = true;
                            }
                        }
                    }

                    push_separator(&mut body, &mut paragraph, &mut main);
                }
                Ok(Event::Text(e)) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = match e.unescape() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("Undecodable text node skipped: {}", err);
                            continue;
                        }
                    };
                    if let Some(buf) = paragraph.as_mut() {
                        buf.push_str(&text);
                    }
                    if in_item {
                        if let Some(capture) = list.as_mut() {
                            if let Some(item) = capture.items.last_mut() {
                                item.push_str(&text);
                            }
                        }
                    }
                    if let Some(capture) = main.as_mut() {
                        capture.text.push_str(&text);
                    }
                    if chrome_depth == 0 {
                        body.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    if chrome_depth == 0 {
                        body.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    // Broken markup should not kill the reader; keep what we
                    // have and stop scanning here.
                    warn!("HTML parse stopped early: {}", err);
                    break;
                }
            }
        }

        if let Some(text) = paragraph.take() {
            doc.finish_paragraph(text);
        }
        doc.body_text = body;

        debug!(
            "Parsed document: {} blocks, main content: {}",
            doc.blocks.len(),
            doc.main_text.is_some()
        );
        Ok(doc)
    }

    fn finish_paragraph(&mut self, text: String) {
        let text = collapse_whitespace(&text);
        if !text.is_empty() {
            self.blocks.push(Block {
                kind: BlockKind::Paragraph,
                text,
            });
        }
    }

    /// Serialize a captured list into one block, items joined with ordinal
    /// or bullet markers depending on the list type
    fn finish_list(&mut self, capture: ListCapture) {
        let items: Vec<String> = capture
            .items
            .iter()
            .map(|item| collapse_whitespace(item))
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return;
        }

        let text = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if capture.ordered {
                    format!("{}. {}", i + 1, item)
                } else {
                    format!("\u{2022} {}", item)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.blocks.push(Block {
            kind: if capture.ordered {
                BlockKind::OrderedList
            } else {
                BlockKind::UnorderedList
            },
            text,
        });
    }

    /// Speakable blocks in document order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Text of the first main-content container longer than 100 characters
    pub fn main_text(&self) -> Option<&str> {
        self.main_text.as_deref()
    }

    /// Whole-body text with scripts and chrome removed (not yet normalized)
    pub fn body_text(&self) -> &str {
        &self.body_text
    }
}

/// Keep blocks apart in the accumulating text views
fn push_separator(body: &mut String, paragraph: &mut Option<String>, main: &mut Option<MainCapture>) {
    body.push(' ');
    if let Some(buf) = paragraph.as_mut() {
        buf.push(' ');
    }
    if let Some(capture) = main.as_mut() {
        capture.text.push(' ');
    }
}

fn tag_name(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).to_lowercase()
}

/// Does this element match one of the main-content selectors?
fn matches_main_content(tag: &str, e: &BytesStart<'_>) -> bool {
    let mut id = String::new();
    let mut classes = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"id" => id = String::from_utf8_lossy(&attr.value).to_string(),
            b"class" => classes = String::from_utf8_lossy(&attr.value).to_string(),
            _ => {}
        }
    }

    MAIN_CONTENT_SELECTORS.iter().any(|selector| {
        if let Some(class) = selector.strip_prefix('.') {
            classes.split_whitespace().any(|c| c == class)
        } else if let Some(wanted) = selector.strip_prefix('#') {
            id == wanted
        } else {
            tag == *selector
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_paragraphs_in_order() {
        let doc = Document::parse(
            "<html><body><p>First paragraph here.</p><div><p>Second   one\n with spaces.</p></div></body></html>",
        )
        .unwrap();
        let blocks = doc.blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "First paragraph here.");
        assert_eq!(blocks[1].text, "Second one with spaces.");
    }

    #[test]
    fn serializes_ordered_and_unordered_lists() {
        let doc = Document::parse(
            "<body><ol><li>alpha</li><li>beta</li></ol><ul><li>one</li><li>two</li></ul></body>",
        )
        .unwrap();
        let blocks = doc.blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::OrderedList);
        assert_eq!(blocks[0].text, "1. alpha\n2. beta");
        assert_eq!(blocks[1].kind, BlockKind::UnorderedList);
        assert_eq!(blocks[1].text, "\u{2022} one\n\u{2022} two");
    }

    #[test]
    fn script_and_style_are_invisible() {
        let doc = Document::parse(
            "<body><p>Visible text only.</p><script>var x = 1;</script><style>p{}</style></body>",
        )
        .unwrap();
        assert_eq!(doc.blocks().len(), 1);
        assert!(!doc.body_text().contains("var x"));
        assert!(!doc.body_text().contains("p{}"));
    }

    #[test]
    fn chrome_excluded_from_body_but_not_paragraphs() {
        let doc = Document::parse(
            "<body><nav><p>Navigation menu links here, long enough.</p></nav><p>Article body text.</p></body>",
        )
        .unwrap();
        // Both paragraphs scan; only the body view drops the nav subtree
        assert_eq!(doc.blocks().len(), 2);
        assert!(!doc.body_text().contains("Navigation"));
        assert!(doc.body_text().contains("Article body"));
    }

    #[test]
    fn finds_main_content_container() {
        let filler = "word ".repeat(30);
        let html = format!(
            "<body><div class=\"sidebar\">short</div><div class=\"post-content\">{}</div></body>",
            filler
        );
        let doc = Document::parse(&html).unwrap();
        assert!(doc.main_text().is_some());
        assert!(doc.main_text().unwrap().starts_with("word word"));
    }

    #[test]
    fn short_container_is_not_main_content() {
        let doc =
            Document::parse("<body><main>too short</main><p>Regular paragraph text.</p></body>")
                .unwrap();
        assert!(doc.main_text().is_none());
    }

    #[test]
    fn tolerates_unclosed_tags() {
        let doc = Document::parse("<body><p>First without close<p>Second paragraph.</body>");
        let doc = doc.unwrap();
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0].text, "First without close");
    }

    #[test]
    fn void_elements_do_not_break_nesting() {
        let doc = Document::parse("<body><p>Before<br>after the break.</p></body>").unwrap();
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.blocks()[0].text, "Before after the break.");
    }
}
