//! External names for discovered operations and URI template handling.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern compiles"))
}

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("scheme pattern compiles"))
}

fn strip_scheme(uri: &str) -> &str {
    match scheme_re().find(uri) {
        Some(found) => &uri[found.end()..],
        None => uri,
    }
}

/// `<prefix>-<tool>`
pub fn action_name(prefix: &str, tool: &str) -> String {
    format!("{}-{}", prefix, tool)
}

/// `resolve://timeline/markers` → `<prefix>-read-timeline-markers`
pub fn resource_name(prefix: &str, uri: &str) -> String {
    format!("{}-read-{}", prefix, strip_scheme(uri).replace('/', "-"))
}

/// `resolve://clips/{clip_name}/properties` → `<prefix>-read-clips-properties`
pub fn template_name(prefix: &str, uri_template: &str) -> String {
    let without_placeholders = placeholder_re().replace_all(strip_scheme(uri_template), "");
    let slug = without_placeholders
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!("{}-read-{}", prefix, slug)
}

/// Placeholder names in order of appearance.
pub fn template_params(uri_template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(uri_template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitutes percent-encoded argument values into the template.
/// Arguments must already have passed the template's signature.
pub fn expand_template(uri_template: &str, params: &[String], args: &Map<String, Value>) -> String {
    let mut uri = uri_template.to_string();
    for param in params {
        let raw = match args.get(param) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let encoded = utf8_percent_encode(&raw, URI_COMPONENT).to_string();
        uri = uri.replacen(&format!("{{{}}}", param), &encoded, 1);
    }
    uri
}
