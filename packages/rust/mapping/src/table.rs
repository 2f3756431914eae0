//! Ordered column-to-field mapping table.

use std::path::Path;

use fieldmap_shared::{FieldMapError, Result};

use crate::target::TargetRule;
use crate::xml;

/// One entry of a mapping table: a source column and the rule applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingLink {
    /// Column label in the query result.
    pub source: String,
    /// Rule producing the output field.
    pub target: TargetRule,
}

/// Ordered collection of mapping links.
///
/// Order is significant: rules run in insertion order, and values of rules
/// sharing a target name accumulate in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    links: Vec<MappingLink>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule for `source`.
    pub fn push(&mut self, source: impl Into<String>, target: TargetRule) {
        self.links.push(MappingLink {
            source: source.into(),
            target,
        });
    }

    /// Builder form of [`MappingTable::push`].
    pub fn with(mut self, source: impl Into<String>, target: TargetRule) -> Self {
        self.push(source, target);
        self
    }

    pub fn rules(&self) -> &[MappingLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Whether any rule crawls its value, i.e. a crawl worker must be provisioned.
    pub fn has_crawl_target(&self) -> bool {
        self.links.iter().any(|link| link.target.crawl_url())
    }

    /// Whether any rule parses a file named by its value.
    pub fn has_file_target(&self) -> bool {
        self.links.iter().any(|link| link.target.file_path())
    }

    /// Validate every rule; the first failure is reported with its source column.
    pub fn validate(&self) -> Result<()> {
        for link in &self.links {
            if link.source.is_empty() {
                return Err(FieldMapError::validation(format!(
                    "rule for target {:?} has an empty source column",
                    link.target.target_name()
                )));
            }
            link.target.validate().map_err(|e| {
                FieldMapError::validation(format!("column {:?}: {e}", link.source))
            })?;
        }
        Ok(())
    }

    /// Parse a table from its XML form.
    pub fn from_xml(input: &str) -> Result<Self> {
        xml::read_table(input)
    }

    /// Serialize the table to XML.
    pub fn to_xml(&self) -> Result<String> {
        xml::write_table(self)
    }

    /// Load a table from an XML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FieldMapError::io(path, e))?;
        let table = Self::from_xml(&content)?;
        tracing::debug!(?path, rules = table.len(), "loaded mapping table");
        Ok(table)
    }

    /// Write the table to an XML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_xml()?;
        std::fs::write(path, content).map_err(|e| FieldMapError::io(path, e))
    }
}
