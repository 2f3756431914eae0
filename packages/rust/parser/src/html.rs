//! HTML parser.
//!
//! Finds the main content area with the usual readability heuristics
//! (`<main>`, `<article>`, `[role=main]`, then `<body>`) and converts it to
//! Markdown with `htmd`, skipping navigation chrome.

use std::path::Path;
use std::sync::LazyLock;

use scraper::{Html, Selector};

use fieldmap_mapping::Parser;
use fieldmap_shared::{FieldMapError, IndexDocument, ParserOptions, Result};

use crate::{FIELD_FILENAME, ParserKind, file_name_of, read_limited};

/// Tags dropped during Markdown conversion.
const SKIP_TAGS: [&str; 10] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg", "form",
];

/// Content containers tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: [&str; 4] = ["main", "article", r#"[role="main"]"#, "body"];

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static HTML_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("html").expect("valid selector"));
static DESCRIPTION_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="description"]"#).expect("valid selector")
});

/// Factory for [`HtmlParser`].
pub struct HtmlParserKind;

impl ParserKind for HtmlParserKind {
    fn name(&self) -> &str {
        "html"
    }

    fn extensions(&self) -> &[&str] {
        &["html", "htm", "xhtml"]
    }

    fn mime_types(&self) -> &[&str] {
        &["text/html", "application/xhtml+xml"]
    }

    fn create(&self, options: &ParserOptions) -> Result<Box<dyn Parser>> {
        Ok(Box::new(HtmlParser::new(options)))
    }
}

/// Parser for HTML files.
pub struct HtmlParser {
    max_file_bytes: u64,
    document: IndexDocument,
}

impl HtmlParser {
    pub fn new(options: &ParserOptions) -> Self {
        Self {
            max_file_bytes: options.max_file_bytes,
            document: IndexDocument::new(),
        }
    }
}

impl Parser for HtmlParser {
    fn extract(&mut self, path: &Path) -> Result<()> {
        self.document = IndexDocument::new();

        let bytes = read_limited(path, self.max_file_bytes)?;
        let html = String::from_utf8_lossy(&bytes);
        let mut document = extract_html_document(&html)?;
        document.add(FIELD_FILENAME, file_name_of(path));

        self.document = document;
        Ok(())
    }

    fn populate(&self, document: &mut IndexDocument) {
        document.merge(&self.document);
    }

    fn name(&self) -> &str {
        "html"
    }
}

/// Extract `title`, `lang`, `description` and Markdown `content` from an HTML page.
pub fn extract_html_document(html: &str) -> Result<IndexDocument> {
    let doc = Html::parse_document(html);
    let mut document = IndexDocument::new();

    if let Some(title) = extract_title(&doc) {
        document.add("title", title);
    }

    if let Some(lang) = doc
        .select(&HTML_SEL)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
    {
        document.add("lang", lang);
    }

    if let Some(description) = doc
        .select(&DESCRIPTION_SEL)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        document.add("description", description);
    }

    let content = to_markdown(&content_html(&doc))?;
    if !content.is_empty() {
        document.add("content", content);
    }

    Ok(document)
}

/// `<title>` text, else the first `<h1>`.
fn extract_title(doc: &Html) -> Option<String> {
    [&*TITLE_SEL, &*H1_SEL].into_iter().find_map(|sel| {
        doc.select(sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

fn content_html(doc: &Html) -> String {
    for sel_str in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            return el.inner_html();
        }
    }
    String::new()
}

fn to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(html)
        .map_err(|e| FieldMapError::parse(format!("htmd conversion failed: {e}")))?;
    Ok(markdown.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_title_element() {
        let doc = extract_html_document(
            "<html><head><title> Catalog </title></head><body><h1>Heading</h1></body></html>",
        )
        .unwrap();
        assert_eq!(doc.values("title"), ["Catalog"]);
    }

    #[test]
    fn title_falls_back_to_h1() {
        let doc = extract_html_document("<html><body><h1>Only Heading</h1></body></html>").unwrap();
        assert_eq!(doc.first("title"), Some("Only Heading"));
    }

    #[test]
    fn main_content_is_markdown() {
        let doc = extract_html_document(
            r#"<html><head><meta name="description" content="About widgets"></head><body>
            <header>Site</header>
            <article><h2>Usage</h2><p>Turn it <em>on</em>.</p></article>
            <footer>Copyright</footer></body></html>"#,
        )
        .unwrap();
        assert_eq!(doc.first("description"), Some("About widgets"));
        let content = doc.first("content").unwrap();
        assert!(content.contains("Usage"));
        assert!(content.contains("Turn it"));
        assert!(!content.contains("Copyright"));
    }

    #[test]
    fn empty_page_has_no_fields() {
        let doc = extract_html_document("").unwrap();
        assert!(doc.is_empty());
    }
}
