//! String transforms behind `get_as_html` and `get_as_url`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static HTML_SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[&<>"'/`]"#).expect("valid html escape regex"));

/// String form of an attribute value: raw text for strings, JSON text
/// otherwise.
///
/// A missing attribute renders as the empty string, never as a placeholder
/// word such as `undefined`, so escaped output can be dropped into markup
/// as-is.
pub fn value_to_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Escapes `&`, `<`, `>`, `"`, `'`, `/` and the backtick as HTML entities.
pub fn escape_html(value: &str) -> String {
    HTML_SPECIAL_RE
        .replace_all(value, |caps: &Captures<'_>| match &caps[0] {
            "&" => "&amp;",
            "<" => "&lt;",
            ">" => "&gt;",
            "\"" => "&quot;",
            "'" => "&#x27;",
            "/" => "&#x2F;",
            _ => "&#x60;",
        })
        .into_owned()
}

/// Percent-encodes every byte outside `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if is_unreserved(byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}
