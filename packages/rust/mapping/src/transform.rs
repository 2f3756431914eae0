//! Text transform chain applied to a column value before it is emitted.
//!
//! Each pass is a function `&str -> String` applied in a fixed order:
//! entity decoding, then tag removal, then pattern substitution.

use std::sync::LazyLock;

use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};

use fieldmap_shared::{FieldMapError, Result};

use crate::target::TargetRule;

/// Run every pass enabled on `rule` over `content`.
pub fn apply(rule: &TargetRule, content: &str) -> Result<String> {
    let mut result = content.to_string();

    if rule.convert_html_entities() {
        result = decode_entities(&result);
    }
    if rule.remove_tag() {
        result = remove_tags(&result);
    }
    match (rule.find_pattern(), rule.replace_regex()) {
        (Some(find), replace) => result = replace_pattern(&result, find.regex(), replace)?,
        (None, Some(_)) => {
            tracing::debug!(field = rule.target_name(), "replacement without pattern ignored");
        }
        (None, None) => {}
    }

    Ok(result)
}

// ---------------------------------------------------------------------------
// Pass 1: Decode HTML entities
// ---------------------------------------------------------------------------

/// Decode complete `&name;`, `&#n;` and `&#xh;` references.
///
/// Anything else (unknown names, references without the closing `;`,
/// code points outside Unicode) is left as written, and so is every other
/// character, line breaks and NUL included.
pub fn decode_entities(text: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([A-Za-z][A-Za-z0-9]{0,31}));")
            .expect("valid regex")
    });

    if !text.contains('&') {
        return text.to_string();
    }

    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else {
                caps.get(3)
                    .and_then(|name| resolve_html5_entity(name.as_str()))
                    .map(str::to_string)
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Remove markup tags
// ---------------------------------------------------------------------------

/// Remove everything that looks like a tag, keeping the text between tags.
pub fn remove_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    TAG_RE.replace_all(text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Pattern substitution
// ---------------------------------------------------------------------------

/// Replace every match of `find` with `replace`; no replacement removes matches.
///
/// `replace` uses `$n` / `${name}` group references and `\` escapes, read
/// by [`replacement_template`].
pub fn replace_pattern(text: &str, find: &Regex, replace: Option<&str>) -> Result<String> {
    match replace {
        Some(replace) => {
            let template = replacement_template(find, replace)?;
            Ok(find.replace_all(text, template.as_str()).into_owned())
        }
        None => Ok(find.replace_all(text, "").into_owned()),
    }
}

/// Translate a replacement string into a `regex` expansion template.
///
/// `$` followed by digits names a group: the first digit always belongs to
/// the reference, later digits only while the number stays a group of
/// `find`, so `$1x` is group 1 then `x` and `$12` with one group is group 1
/// then `2`. `${name}` names a group. `\c` is the literal `c`. Any other `$`
/// and references to missing groups are errors.
pub fn replacement_template(find: &Regex, replacement: &str) -> Result<String> {
    let groups = find.captures_len() - 1;
    let invalid = |why: String| {
        FieldMapError::validation(format!("replacement {replacement:?}: {why}"))
    };

    let mut out = String::with_capacity(replacement.len() + 8);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some(escaped) => out.push(escaped),
                None => return Err(invalid("trailing backslash".into())),
            },
            '$' => match chars.next() {
                Some(first) if first.is_ascii_digit() => {
                    let mut group = first.to_digit(10).unwrap_or_default() as usize;
                    while let Some(next) = chars.peek().and_then(|c| c.to_digit(10)) {
                        let longer = group * 10 + next as usize;
                        if longer > groups {
                            break;
                        }
                        group = longer;
                        chars.next();
                    }
                    if group > groups {
                        return Err(invalid(format!("no group {group}")));
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('{') => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(invalid("unclosed group name".into())),
                        }
                    }
                    if !find.capture_names().flatten().any(|n| n == name) {
                        return Err(invalid(format!("no group named {name:?}")));
                    }
                    out.push_str(&format!("${{{name}}}"));
                }
                _ => return Err(invalid("illegal group reference".into())),
            },
            other => out.push(other),
        }
    }
    Ok(out)
}
