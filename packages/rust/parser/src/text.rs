//! Plain text parser.

use std::path::Path;

use fieldmap_mapping::Parser;
use fieldmap_shared::{IndexDocument, ParserOptions, Result};

use crate::{FIELD_FILENAME, ParserKind, file_name_of, read_limited};

/// Factory for [`TextParser`].
pub struct TextParserKind;

impl ParserKind for TextParserKind {
    fn name(&self) -> &str {
        "text"
    }

    fn extensions(&self) -> &[&str] {
        &["txt", "text", "md", "markdown", "csv", "log"]
    }

    fn mime_types(&self) -> &[&str] {
        &["text/plain", "text/markdown", "text/csv"]
    }

    fn create(&self, options: &ParserOptions) -> Result<Box<dyn Parser>> {
        Ok(Box::new(TextParser::new(options)))
    }
}

/// Emits the whole file as `content`, plus `filename`.
pub struct TextParser {
    max_file_bytes: u64,
    document: IndexDocument,
}

impl TextParser {
    pub fn new(options: &ParserOptions) -> Self {
        Self {
            max_file_bytes: options.max_file_bytes,
            document: IndexDocument::new(),
        }
    }
}

impl Parser for TextParser {
    fn extract(&mut self, path: &Path) -> Result<()> {
        self.document = IndexDocument::new();

        let bytes = read_limited(path, self.max_file_bytes)?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim();

        let mut document = IndexDocument::new();
        if !text.is_empty() {
            document.add("content", text);
        }
        document.add(FIELD_FILENAME, file_name_of(path));

        self.document = document;
        Ok(())
    }

    fn populate(&self, document: &mut IndexDocument) {
        document.merge(&self.document);
    }

    fn name(&self) -> &str {
        "text"
    }
}
