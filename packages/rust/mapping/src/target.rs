//! Per-field transform policy attached to a mapped column.

use regex::Regex;

use fieldmap_shared::{FieldMapError, Result};

use crate::transform::replacement_template;

/// A find pattern compiled when the rule is built. Compares by source text.
#[derive(Debug, Clone)]
pub struct FindPattern(Regex);

impl FindPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| FieldMapError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl PartialEq for FindPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for FindPattern {}

/// How one source column becomes values of one output field.
///
/// Rules are built once when the mapping table is loaded and are read-only
/// while rows are processed. A find pattern that does not compile is refused
/// when it is set; other inconsistent combinations are accepted here and
/// reported by [`TargetRule::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRule {
    target_name: String,
    remove_tag: bool,
    convert_html_entities: bool,
    file_path: bool,
    file_path_prefix: Option<String>,
    crawl_url: bool,
    find_regex: Option<FindPattern>,
    replace_regex: Option<String>,
}

impl TargetRule {
    /// A plain copy rule: the column value is emitted unchanged under `target_name`.
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            ..Self::default()
        }
    }

    /// Strip markup tags from the value.
    pub fn with_remove_tag(mut self, on: bool) -> Self {
        self.remove_tag = on;
        self
    }

    /// Decode HTML character entities in the value.
    pub fn with_convert_html_entities(mut self, on: bool) -> Self {
        self.convert_html_entities = on;
        self
    }

    /// Treat the value as a file name under `prefix` and parse the file.
    pub fn with_file_path(mut self, prefix: Option<impl Into<String>>) -> Self {
        self.file_path = true;
        self.file_path_prefix = prefix.map(Into::into);
        self
    }

    /// Treat the value as a URL and crawl it.
    pub fn with_crawl_url(mut self, on: bool) -> Self {
        self.crawl_url = on;
        self
    }

    /// Replace matches of `find` with `replace` (absent replacement removes matches).
    pub fn with_regex(
        mut self,
        find: impl AsRef<str>,
        replace: Option<impl Into<String>>,
    ) -> Result<Self> {
        self.find_regex = Some(FindPattern::new(find.as_ref())?);
        self.replace_regex = replace.map(Into::into);
        Ok(self)
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn remove_tag(&self) -> bool {
        self.remove_tag
    }

    pub fn convert_html_entities(&self) -> bool {
        self.convert_html_entities
    }

    pub fn file_path(&self) -> bool {
        self.file_path
    }

    pub fn file_path_prefix(&self) -> Option<&str> {
        self.file_path_prefix.as_deref()
    }

    pub fn crawl_url(&self) -> bool {
        self.crawl_url
    }

    pub fn find_regex(&self) -> Option<&str> {
        self.find_regex.as_ref().map(FindPattern::as_str)
    }

    pub fn find_pattern(&self) -> Option<&FindPattern> {
        self.find_regex.as_ref()
    }

    pub fn replace_regex(&self) -> Option<&str> {
        self.replace_regex.as_deref()
    }

    pub fn set_remove_tag(&mut self, on: bool) {
        self.remove_tag = on;
    }

    pub fn set_convert_html_entities(&mut self, on: bool) {
        self.convert_html_entities = on;
    }

    /// Turning the file branch off also clears its prefix.
    pub fn set_file_path(&mut self, on: bool) {
        self.file_path = on;
        if !on {
            self.file_path_prefix = None;
        }
    }

    pub fn set_file_path_prefix(&mut self, prefix: Option<String>) {
        self.file_path_prefix = prefix;
    }

    pub fn set_crawl_url(&mut self, on: bool) {
        self.crawl_url = on;
    }

    /// Compile and install a find pattern; `None` clears it.
    pub fn set_find_regex(&mut self, pattern: Option<&str>) -> Result<()> {
        self.find_regex = pattern.map(FindPattern::new).transpose()?;
        Ok(())
    }

    pub fn set_replace_regex(&mut self, replacement: Option<String>) {
        self.replace_regex = replacement;
    }

    /// Check the rule for combinations that cannot be applied.
    pub fn validate(&self) -> Result<()> {
        if self.target_name.trim().is_empty() {
            return Err(FieldMapError::validation("target name is empty"));
        }
        match (&self.find_regex, &self.replace_regex) {
            (Some(pattern), Some(replacement)) => {
                replacement_template(pattern.regex(), replacement)?;
            }
            (Some(_), None) | (None, None) => {}
            (None, Some(_)) => {
                return Err(FieldMapError::validation(format!(
                    "target {:?} has a replacement but no find pattern",
                    self.target_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rule_is_plain_copy() {
        let rule = TargetRule::new("title");
        assert_eq!(rule.target_name(), "title");
        assert!(!rule.remove_tag());
        assert!(!rule.file_path());
        assert!(!rule.crawl_url());
        assert_eq!(rule.find_regex(), None);
    }

    #[test]
    fn disabling_file_path_clears_prefix() {
        let mut rule = TargetRule::new("body").with_file_path(Some("/data/"));
        assert_eq!(rule.file_path_prefix(), Some("/data/"));

        rule.set_file_path(false);
        assert!(!rule.file_path());
        assert_eq!(rule.file_path_prefix(), None);
    }

    #[test]
    fn enabling_file_path_keeps_prefix() {
        let mut rule = TargetRule::new("body").with_file_path(Some("/data/"));
        rule.set_file_path(true);
        assert_eq!(rule.file_path_prefix(), Some("/data/"));
    }

    #[test]
    fn validate_rejects_empty_target() {
        let err = TargetRule::new("  ").validate().unwrap_err();
        assert!(err.to_string().contains("target name is empty"));
    }

    #[test]
    fn bad_pattern_is_refused_when_set() {
        let err = TargetRule::new("id").with_regex("(unclosed", Some("x")).unwrap_err();
        assert!(matches!(err, FieldMapError::Pattern { .. }));

        let mut rule = TargetRule::new("id");
        assert!(rule.set_find_regex(Some("[")).is_err());
        assert_eq!(rule.find_regex(), None);
    }

    #[test]
    fn patterns_compare_by_source() {
        let a = TargetRule::new("id").with_regex(r"\d+", Some("#")).unwrap();
        let b = TargetRule::new("id").with_regex(r"\d+", Some("#")).unwrap();
        let c = TargetRule::new("id").with_regex(r"\d", Some("#")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn clearing_the_pattern() {
        let mut rule = TargetRule::new("id").with_regex("x", None::<String>).unwrap();
        rule.set_find_regex(None).unwrap();
        assert!(rule.find_pattern().is_none());
    }

    #[test]
    fn validate_rejects_unknown_group_in_replacement() {
        let rule = TargetRule::new("id").with_regex(r"(\d+)", Some("$2")).unwrap();
        assert!(matches!(rule.validate(), Err(FieldMapError::Validation { .. })));
    }

    #[test]
    fn validate_rejects_replacement_without_pattern() {
        let mut rule = TargetRule::new("id");
        rule.set_replace_regex(Some("#".into()));
        assert!(rule.validate().is_err());
    }

    #[test]
    fn validate_accepts_pattern_without_replacement() {
        let rule = TargetRule::new("id").with_regex(r"\s+", None::<String>).unwrap();
        assert!(rule.validate().is_ok());
    }
}
