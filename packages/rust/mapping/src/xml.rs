//! XML form of a mapping table.
//!
//! ```xml
//! <map>
//!   <link source="body" target="content">
//!     <filter removeTag="yes" convertHtmlEntities="no" filePath="no" crawlUrl="no"/>
//!   </link>
//! </map>
//! ```
//!
//! Flags are true only for the token `yes` (any case). String attributes are
//! omitted when unset, so an empty attribute and a missing one stay distinct.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

use fieldmap_shared::{FieldMapError, Result};

use crate::table::MappingTable;
use crate::target::TargetRule;

const ROOT: &str = "map";
const LINK: &str = "link";
const FILTER: &str = "filter";

const ATTR_SOURCE: &str = "source";
const ATTR_TARGET: &str = "target";
const ATTR_REMOVE_TAG: &str = "removeTag";
const ATTR_CONVERT_ENTITIES: &str = "convertHtmlEntities";
const ATTR_FILE_PATH: &str = "filePath";
const ATTR_FILE_PATH_PREFIX: &str = "filePathPrefix";
const ATTR_CRAWL_URL: &str = "crawlUrl";
const ATTR_FIND_REGEX: &str = "findRegexTag";
const ATTR_REPLACE_REGEX: &str = "replaceRegexTag";

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse every `<link>` element of `input`, in document order.
pub(crate) fn read_table(input: &str) -> Result<MappingTable> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut table = MappingTable::new();
    let mut pending: Option<(String, TargetRule)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            FieldMapError::Xml(format!("at byte {}: {e}", reader.error_position()))
        })?;

        match event {
            Event::Start(e) if e.name().as_ref() == LINK.as_bytes() => {
                pending = Some(link_head(&reader, &e)?);
            }
            Event::Empty(e) if e.name().as_ref() == LINK.as_bytes() => {
                let (source, rule) = link_head(&reader, &e)?;
                table.push(source, rule);
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == FILTER.as_bytes() => {
                let attrs = attributes(&reader, &e)?;
                match pending.as_mut() {
                    Some((_, rule)) => apply_filter(rule, &attrs)?,
                    None => tracing::debug!("ignoring <filter> outside of <link>"),
                }
            }
            Event::End(e) if e.name().as_ref() == LINK.as_bytes() => {
                if let Some((source, rule)) = pending.take() {
                    table.push(source, rule);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if pending.is_some() {
        return Err(FieldMapError::Xml(format!("unclosed <{LINK}> element")));
    }

    Ok(table)
}

/// Source column and a fresh rule from a `<link>` element's attributes.
fn link_head(reader: &Reader<&[u8]>, element: &BytesStart) -> Result<(String, TargetRule)> {
    let attrs = attributes(reader, element)?;
    let source = required(&attrs, ATTR_SOURCE)?;
    let target = required(&attrs, ATTR_TARGET)?;
    Ok((source, TargetRule::new(target)))
}

/// Merge one `<filter>` element into `rule`.
///
/// Flags accumulate across filters; string attributes take the last filter's
/// value, and a filter without the attribute resets it. A find pattern that
/// does not compile fails the load.
fn apply_filter(rule: &mut TargetRule, attrs: &[(String, String)]) -> Result<()> {
    if is_yes(attrs, ATTR_REMOVE_TAG) {
        rule.set_remove_tag(true);
    }
    if is_yes(attrs, ATTR_CONVERT_ENTITIES) {
        rule.set_convert_html_entities(true);
    }
    if is_yes(attrs, ATTR_FILE_PATH) {
        rule.set_file_path(true);
    }
    rule.set_file_path_prefix(optional(attrs, ATTR_FILE_PATH_PREFIX));
    if is_yes(attrs, ATTR_CRAWL_URL) {
        rule.set_crawl_url(true);
    }
    rule.set_find_regex(optional(attrs, ATTR_FIND_REGEX).as_deref())?;
    rule.set_replace_regex(optional(attrs, ATTR_REPLACE_REGEX));
    Ok(())
}

fn attributes(reader: &Reader<&[u8]>, element: &BytesStart) -> Result<Vec<(String, String)>> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| FieldMapError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| FieldMapError::Xml(format!("attribute {key}: {e}")))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn optional(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

fn required(attrs: &[(String, String)], name: &str) -> Result<String> {
    optional(attrs, name)
        .ok_or_else(|| FieldMapError::Xml(format!("<{LINK}> is missing the {name:?} attribute")))
}

fn is_yes(attrs: &[(String, String)], name: &str) -> bool {
    optional(attrs, name).is_some_and(|value| value.eq_ignore_ascii_case("yes"))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize `table` with one `<filter>` per link.
pub(crate) fn write_table(table: &MappingTable) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Start(BytesStart::new(ROOT)))?;
    for link in table.rules() {
        let mut element = BytesStart::new(LINK);
        element.push_attribute((ATTR_SOURCE, link.source.as_str()));
        element.push_attribute((ATTR_TARGET, link.target.target_name()));
        write(&mut writer, Event::Start(element))?;
        write(&mut writer, Event::Empty(filter_element(&link.target)))?;
        write(&mut writer, Event::End(BytesEnd::new(LINK)))?;
    }
    write(&mut writer, Event::End(BytesEnd::new(ROOT)))?;

    String::from_utf8(writer.into_inner()).map_err(|e| FieldMapError::Xml(e.to_string()))
}

fn filter_element(rule: &TargetRule) -> BytesStart<'_> {
    let mut filter = BytesStart::new(FILTER);
    filter.push_attribute((ATTR_REMOVE_TAG, yes_no(rule.remove_tag())));
    filter.push_attribute((ATTR_CONVERT_ENTITIES, yes_no(rule.convert_html_entities())));
    filter.push_attribute((ATTR_FILE_PATH, yes_no(rule.file_path())));
    if let Some(prefix) = rule.file_path_prefix() {
        filter.push_attribute((ATTR_FILE_PATH_PREFIX, prefix));
    }
    filter.push_attribute((ATTR_CRAWL_URL, yes_no(rule.crawl_url())));
    if let Some(find) = rule.find_regex() {
        filter.push_attribute((ATTR_FIND_REGEX, find));
    }
    if let Some(replace) = rule.replace_regex() {
        filter.push_attribute((ATTR_REPLACE_REGEX, replace));
    }
    filter
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| FieldMapError::Xml(e.to_string()))
}

fn yes_no(on: bool) -> &'static str {
    if on { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> MappingTable {
        let mut no_prefix = TargetRule::new("attachment").with_file_path(None::<String>);
        no_prefix.set_remove_tag(true);

        let mut orphan_prefix = TargetRule::new("legacy");
        orphan_prefix.set_file_path_prefix(Some("/old/".into()));

        MappingTable::new()
            .with("title", TargetRule::new("title"))
            .with(
                "body",
                TargetRule::new("content")
                    .with_remove_tag(true)
                    .with_convert_html_entities(true)
                    .with_regex(r"<\s*br\s*/?>", Some(" & "))
                    .unwrap(),
            )
            .with("doc", TargetRule::new("file").with_file_path(Some("")))
            .with("doc", no_prefix)
            .with("link", TargetRule::new("page").with_crawl_url(true))
            .with("sku", TargetRule::new("sku").with_regex(r"\d+", None::<String>).unwrap())
            .with("old", orphan_prefix)
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let table = sample_table();
        let xml = table.to_xml().expect("serialize");
        let parsed = MappingTable::from_xml(&xml).expect("parse");
        assert_eq!(parsed, table);
    }

    #[test]
    fn roundtrip_keeps_empty_and_absent_strings_apart() {
        let xml = sample_table().to_xml().unwrap();
        let parsed = MappingTable::from_xml(&xml).unwrap();

        assert_eq!(parsed.rules()[2].target.file_path_prefix(), Some(""));
        assert_eq!(parsed.rules()[3].target.file_path_prefix(), None);
        assert_eq!(parsed.rules()[5].target.replace_regex(), None);
    }

    #[test]
    fn writes_yes_and_no_tokens() {
        let table = MappingTable::new().with("a", TargetRule::new("b").with_remove_tag(true));
        let xml = table.to_xml().unwrap();
        assert!(xml.contains(r#"removeTag="yes""#));
        assert!(xml.contains(r#"crawlUrl="no""#));
        assert!(!xml.contains("filePathPrefix"));
    }

    #[test]
    fn yes_is_case_insensitive() {
        let xml = r#"<map><link source="a" target="b">
            <filter removeTag="YES" convertHtmlEntities="Yes" filePath="true" crawlUrl="on"/>
        </link></map>"#;
        let table = MappingTable::from_xml(xml).unwrap();
        let rule = &table.rules()[0].target;
        assert!(rule.remove_tag());
        assert!(rule.convert_html_entities());
        assert!(!rule.file_path());
        assert!(!rule.crawl_url());
    }

    #[test]
    fn link_without_filter_is_plain_copy() {
        let xml = r#"<map><link source="a" target="b"/><link source="c" target="d"></link></map>"#;
        let table = MappingTable::from_xml(xml).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rules()[0].target, TargetRule::new("b"));
        assert_eq!(table.rules()[1].source, "c");
    }

    #[test]
    fn multiple_filters_or_flags_and_keep_last_strings() {
        let xml = r#"<map><link source="a" target="b">
            <filter removeTag="yes" findRegexTag="x"/>
            <filter crawlUrl="yes" filePathPrefix="/p/"/>
        </link></map>"#;
        let table = MappingTable::from_xml(xml).unwrap();
        let rule = &table.rules()[0].target;
        assert!(rule.remove_tag());
        assert!(rule.crawl_url());
        assert_eq!(rule.file_path_prefix(), Some("/p/"));
        assert_eq!(rule.find_regex(), None);
    }

    #[test]
    fn escapes_pattern_characters() {
        let table = MappingTable::new().with(
            "a",
            TargetRule::new("b")
                .with_regex(r#"<[^>]*>"#, Some("\"&'"))
                .unwrap(),
        );
        let xml = table.to_xml().unwrap();
        let parsed = MappingTable::from_xml(&xml).unwrap();
        assert_eq!(parsed.rules()[0].target.find_regex(), Some("<[^>]*>"));
        assert_eq!(parsed.rules()[0].target.replace_regex(), Some("\"&'"));
    }

    #[test]
    fn roundtrip_every_flag_combination() {
        let tricky = "a\"b<c&d\ne";
        for mask in 0..16u8 {
            for text in [None, Some(""), Some(tricky)] {
                let mut rule = TargetRule::new("t");
                rule.set_remove_tag(mask & 1 != 0);
                rule.set_convert_html_entities(mask & 2 != 0);
                rule.set_file_path(mask & 4 != 0);
                rule.set_crawl_url(mask & 8 != 0);
                rule.set_file_path_prefix(text.map(String::from));
                rule.set_find_regex(text).unwrap();
                rule.set_replace_regex(text.map(String::from));

                let table = MappingTable::new().with(tricky, rule);
                let xml = table.to_xml().unwrap();
                let parsed = MappingTable::from_xml(&xml).unwrap();
                assert_eq!(parsed, table, "mask {mask:04b}, text {text:?}");
            }
        }
    }

    #[test]
    fn bad_pattern_fails_the_load() {
        let xml = r#"<map><link source="a" target="b"><filter findRegexTag="("/></link></map>"#;
        assert!(matches!(
            MappingTable::from_xml(xml),
            Err(FieldMapError::Pattern { .. })
        ));
    }

    #[test]
    fn missing_target_attribute_fails() {
        let err = MappingTable::from_xml(r#"<map><link source="a"/></map>"#).unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn malformed_xml_fails() {
        assert!(MappingTable::from_xml("<map><link source=\"a\" target=\"b\"></map>").is_err());
    }

    #[test]
    fn empty_table_roundtrip() {
        let xml = MappingTable::new().to_xml().unwrap();
        assert!(MappingTable::from_xml(&xml).unwrap().is_empty());
    }
}
