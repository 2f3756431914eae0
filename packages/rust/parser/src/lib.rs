//! File parsers and the registry that selects them.
//!
//! This crate provides:
//! - [`ParserKind`]: a factory for one file type
//! - [`ParserRegistry`]: picks a parser by extension or mime hint; implements
//!   [`ParserGateway`] for the row mapper
//! - [`HtmlParser`], [`TextParser`]: built-in parsers
//! - [`extract_html_document`]: HTML field extraction, shared with the crawler

mod html;
mod text;

use std::io::Read;
use std::path::Path;

use fieldmap_mapping::{Parser, ParserGateway};
use fieldmap_shared::{FieldMapError, ParserOptions, Result};
use tracing::debug;

pub use html::{HtmlParser, HtmlParserKind, extract_html_document};
pub use text::{TextParser, TextParserKind};

/// Field receiving the parsed file's name.
pub const FIELD_FILENAME: &str = "filename";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A file type the registry can hand out parsers for.
pub trait ParserKind: Send + Sync {
    /// Human-readable parser name for tracing.
    fn name(&self) -> &str;

    /// Lowercase file extensions handled, without the dot.
    fn extensions(&self) -> &[&str];

    /// Mime types handled.
    fn mime_types(&self) -> &[&str];

    /// Create a fresh parser instance.
    fn create(&self, options: &ParserOptions) -> Result<Box<dyn Parser>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds parser kinds in priority order.
pub struct ParserRegistry {
    kinds: Vec<Box<dyn ParserKind>>,
    options: ParserOptions,
}

impl ParserRegistry {
    /// Create a registry with the built-in parsers.
    pub fn new(options: ParserOptions) -> Self {
        Self {
            kinds: vec![Box::new(HtmlParserKind), Box::new(TextParserKind)],
            options,
        }
    }

    /// Add a parser kind after the existing ones.
    pub fn register(&mut self, kind: Box<dyn ParserKind>) {
        self.kinds.push(kind);
    }

    /// Find the kind handling `file_name` or, failing that, `mime_hint`.
    pub fn find(&self, file_name: &str, mime_hint: Option<&str>) -> Option<&dyn ParserKind> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        if let Some(ext) = extension.as_deref() {
            if let Some(kind) = self.kinds.iter().find(|k| k.extensions().contains(&ext)) {
                return Some(kind.as_ref());
            }
        }

        let mime = mime_hint?;
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        self.kinds
            .iter()
            .find(|k| {
                k.mime_types()
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(essence))
            })
            .map(|k| k.as_ref())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

impl ParserGateway for ParserRegistry {
    fn resolve(&self, file_name: &str, mime_hint: Option<&str>) -> Result<Option<Box<dyn Parser>>> {
        match self.find(file_name, mime_hint) {
            Some(kind) => {
                debug!(file_name, parser = kind.name(), "parser selected");
                kind.create(&self.options).map(Some)
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read `path`, refusing files larger than `max_bytes`. All failures are I/O faults.
pub(crate) fn read_limited(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path).map_err(|e| FieldMapError::io(path, e))?;
    let len = file.metadata().map_err(|e| FieldMapError::io(path, e))?.len();
    if len > max_bytes {
        return Err(FieldMapError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("file is {len} bytes, limit is {max_bytes}"),
            ),
        ));
    }

    let mut bytes = Vec::with_capacity(len as usize);
    file.take(max_bytes)
        .read_to_end(&mut bytes)
        .map_err(|e| FieldMapError::io(path, e))?;
    Ok(bytes)
}

/// File name of `path` as a string.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use fieldmap_shared::IndexDocument;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fm-parser-{tag}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    // -----------------------------------------------------------------------
    // Registry selection
    // -----------------------------------------------------------------------

    #[test]
    fn selects_by_extension() {
        let registry = ParserRegistry::default();
        assert_eq!(registry.find("index.html", None).map(|k| k.name()), Some("html"));
        assert_eq!(registry.find("NOTES.TXT", None).map(|k| k.name()), Some("text"));
        assert_eq!(registry.find("README.md", None).map(|k| k.name()), Some("text"));
    }

    #[test]
    fn falls_back_to_mime_hint() {
        let registry = ParserRegistry::default();
        let kind = registry.find("download", Some("text/html; charset=utf-8"));
        assert_eq!(kind.map(|k| k.name()), Some("html"));
    }

    #[test]
    fn unknown_type_has_no_parser() {
        let registry = ParserRegistry::default();
        assert!(registry.find("archive.zip", None).is_none());
        assert!(registry.resolve("archive.zip", None).unwrap().is_none());
    }

    #[test]
    fn registered_kind_is_used() {
        struct CsvOnly;

        impl ParserKind for CsvOnly {
            fn name(&self) -> &str {
                "csv-only"
            }
            fn extensions(&self) -> &[&str] {
                &["tsv"]
            }
            fn mime_types(&self) -> &[&str] {
                &[]
            }
            fn create(&self, options: &ParserOptions) -> Result<Box<dyn Parser>> {
                Ok(Box::new(TextParser::new(options)))
            }
        }

        let mut registry = ParserRegistry::default();
        registry.register(Box::new(CsvOnly));
        assert_eq!(registry.find("data.tsv", None).map(|k| k.name()), Some("csv-only"));
    }

    // -----------------------------------------------------------------------
    // Parsing through the gateway
    // -----------------------------------------------------------------------

    #[test]
    fn html_file_populates_fields() {
        let dir = temp_dir("html");
        let path = dir.join("page.html");
        std::fs::write(
            &path,
            r#"<html lang="en"><head><title>Data Sheet</title></head>
            <body><nav>Menu</nav><main><h1>Widget</h1><p>Made of <b>steel</b>.</p></main></body></html>"#,
        )
        .unwrap();

        let registry = ParserRegistry::default();
        let mut parser = registry.resolve("page.html", None).unwrap().expect("html parser");
        parser.extract(&path).unwrap();

        let mut doc = IndexDocument::new();
        parser.populate(&mut doc);
        assert_eq!(doc.first("title"), Some("Data Sheet"));
        assert_eq!(doc.first("lang"), Some("en"));
        assert_eq!(doc.first(FIELD_FILENAME), Some("page.html"));
        let content = doc.first("content").unwrap();
        assert!(content.contains("steel"));
        assert!(!content.contains("Menu"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_file_is_io_fault() {
        let dir = temp_dir("big");
        let path = dir.join("big.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let registry = ParserRegistry::new(ParserOptions { max_file_bytes: 4 });
        let mut parser = registry.resolve("big.txt", None).unwrap().unwrap();
        let err = parser.extract(&path).unwrap_err();
        assert!(err.is_io());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_extract_leaves_nothing_to_populate() {
        let dir = temp_dir("reset");
        let path = dir.join("a.txt");
        std::fs::write(&path, "first file").unwrap();

        let registry = ParserRegistry::default();
        let mut parser = registry.resolve("a.txt", None).unwrap().unwrap();
        parser.extract(&path).unwrap();

        let err = parser.extract(&dir.join("gone.txt")).unwrap_err();
        assert!(err.is_io());

        let mut doc = IndexDocument::new();
        parser.populate(&mut doc);
        assert!(doc.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
