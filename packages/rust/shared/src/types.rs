//! Core domain types: the output document and fetch categories.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// IndexDocument
// ---------------------------------------------------------------------------

/// Multi-valued field accumulator produced by mapping one row.
///
/// `add` always appends; a field can hold any number of values. Fields keep
/// the order in which they first received a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocument {
    fields: Vec<(String, Vec<String>)>,
}

impl IndexDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to `field`.
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, values)) => values.push(value),
            None => self.fields.push((field, vec![value])),
        }
    }

    /// Append every value of every field of `other`, keeping existing values.
    pub fn merge(&mut self, other: &IndexDocument) {
        for (field, values) in other.iter() {
            for value in values {
                self.add(field, value.as_str());
            }
        }
    }

    /// Values held by `field`, empty if the field is absent.
    pub fn values(&self, field: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of `field`.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.values(field).first().map(String::as_str)
    }

    /// Whether `field` holds at least one value.
    pub fn contains(&self, field: &str) -> bool {
        !self.values(field).is_empty()
    }

    /// Field names in first-appearance order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate `(field, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for IndexDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, values) in self.iter() {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// FetchCategory
// ---------------------------------------------------------------------------

/// Origin of a crawl fetch, carried through to the crawl worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchCategory {
    /// On-demand fetch triggered by a database row mapping rule.
    Database,
    /// Fetch requested by an operator.
    Manual,
    /// Fetch from a scheduled recrawl.
    Scheduled,
}

impl std::fmt::Display for FetchCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Database => "database",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_appends_values() {
        let mut doc = IndexDocument::new();
        doc.add("title", "first");
        doc.add("body", "text");
        doc.add("title", "second");

        assert_eq!(doc.values("title"), ["first", "second"]);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.field_names().collect::<Vec<_>>(), ["title", "body"]);
    }

    #[test]
    fn merge_never_replaces() {
        let mut doc = IndexDocument::new();
        doc.add("title", "from row");

        let mut crawled = IndexDocument::new();
        crawled.add("title", "from page");
        crawled.add("url", "https://example.com/");

        doc.merge(&crawled);
        assert_eq!(doc.values("title"), ["from row", "from page"]);
        assert_eq!(doc.first("url"), Some("https://example.com/"));
    }

    #[test]
    fn missing_field_is_empty() {
        let doc = IndexDocument::new();
        assert!(doc.values("nope").is_empty());
        assert!(!doc.contains("nope"));
        assert!(doc.is_empty());
    }

    #[test]
    fn document_serializes_in_field_order() {
        let mut doc = IndexDocument::new();
        doc.add("z", "1");
        doc.add("a", "2");
        let json = serde_json::to_string(&doc).expect("serialize");
        assert_eq!(json, r#"{"z":["1"],"a":["2"]}"#);
    }

    #[test]
    fn category_display() {
        assert_eq!(FetchCategory::Database.to_string(), "database");
    }
}
