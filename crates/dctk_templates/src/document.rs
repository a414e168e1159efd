//! Devcontainer configuration documents.
//!
//! Configuration files are JSON with comments (JSONC). They are parsed into
//! [`serde_json::Value`] after comments and trailing commas are removed, and
//! inspected through accessors that reject unexpected shapes instead of
//! coercing them.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::{TemplateError, TemplateResult};

/// Key holding the Feature map in a devcontainer configuration.
pub const FEATURES_KEY: &str = "features";

/// Parse a JSONC document.
pub fn parse_jsonc(content: &str) -> TemplateResult<Value> {
    let stripped = strip_jsonc(content);
    Ok(serde_json::from_str(&stripped)?)
}

/// Remove comments and trailing commas outside string literals.
pub fn strip_jsonc(content: &str) -> String {
    strip_trailing_commas(&strip_comments(content))
}

fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn strip_trailing_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }

    out
}

/// Borrow the document's Feature map, if it declares one.
pub fn features_map(document: &Value) -> TemplateResult<Option<&Map<String, Value>>> {
    let root = as_object(document)?;
    match root.get(FEATURES_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(TemplateError::InvalidInput(format!(
            "'{}' must be an object, found {}",
            FEATURES_KEY,
            kind(other)
        ))),
    }
}

/// Borrow the document's Feature map mutably, inserting an empty one when absent.
pub fn features_map_mut(document: &mut Value) -> TemplateResult<&mut Map<String, Value>> {
    let root = as_object_mut(document)?;
    let entry = root
        .entry(FEATURES_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    let found = kind(entry);
    entry.as_object_mut().ok_or_else(|| {
        TemplateError::InvalidInput(format!(
            "'{}' must be an object, found {}",
            FEATURES_KEY, found
        ))
    })
}

/// Borrow the document root as an object.
pub fn as_object(document: &Value) -> TemplateResult<&Map<String, Value>> {
    document.as_object().ok_or_else(|| {
        TemplateError::InvalidInput(format!(
            "devcontainer configuration must be an object, found {}",
            kind(document)
        ))
    })
}

fn as_object_mut(document: &mut Value) -> TemplateResult<&mut Map<String, Value>> {
    let found = kind(document);
    document.as_object_mut().ok_or_else(|| {
        TemplateError::InvalidInput(format!(
            "devcontainer configuration must be an object, found {}",
            found
        ))
    })
}

/// Serialize a document with tab indentation and a trailing newline.
pub fn to_pretty_string(document: &Value) -> TemplateResult<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| TemplateError::InvalidInput(e.to_string()))
}

/// Name of a value's JSON type, for error messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_comments_and_trailing_commas() {
        let content = r#"{
    // line comment
    "name": "Alpine", /* block */
    "features": {
        "ghcr.io/devcontainers/features/git:1": {},
    },
}"#;
        let value = parse_jsonc(content).unwrap();
        assert_eq!(value["name"], "Alpine");
        assert!(value["features"]["ghcr.io/devcontainers/features/git:1"].is_object());
    }

    #[test]
    fn test_comment_markers_inside_strings_are_kept() {
        let content = r#"{ "url": "https://example.com/a,}", "glob": "/*.rs" }"#;
        let value = parse_jsonc(content).unwrap();
        assert_eq!(value["url"], "https://example.com/a,}");
        assert_eq!(value["glob"], "/*.rs");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let content = r#"{ "cmd": "echo \"// not a comment\"", }"#;
        let value = parse_jsonc(content).unwrap();
        assert_eq!(value["cmd"], "echo \"// not a comment\"");
    }

    #[test]
    fn test_features_map_absent_or_null() {
        assert!(features_map(&json!({ "image": "x" })).unwrap().is_none());
        assert!(features_map(&json!({ "features": null })).unwrap().is_none());
    }

    #[test]
    fn test_features_map_wrong_shape() {
        assert!(features_map(&json!({ "features": [] })).is_err());
        assert!(features_map(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_features_map_mut_inserts() {
        let mut doc = json!({ "image": "x" });
        features_map_mut(&mut doc)
            .unwrap()
            .insert("a".into(), json!({}));
        assert_eq!(doc, json!({ "image": "x", "features": { "a": {} } }));
    }

    #[test]
    fn test_pretty_string_uses_tabs() {
        let out = to_pretty_string(&json!({ "features": { "a:1": { "v": "1" } } })).unwrap();
        assert_eq!(out, "{\n\t\"features\": {\n\t\t\"a:1\": {\n\t\t\t\"v\": \"1\"\n\t\t}\n\t}\n}\n");
    }
}
