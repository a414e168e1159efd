//! Option placeholder substitution.
//!
//! Templates reference options as `${templateOption:name}`. The option table
//! is resolved once per apply (caller values coerced to the declared type,
//! defaults filling the gaps) and then every text file is rewritten in a
//! single left-to-right pass. Bytes outside a replaced token are kept as-is,
//! and substituted values are never scanned again.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::TemplateOption;

/// Opening of an option placeholder.
pub const TOKEN_PREFIX: &str = "${templateOption:";

/// Closing of an option placeholder.
pub const TOKEN_SUFFIX: char = '}';

/// Resolved option values for one apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSubstitution {
    values: BTreeMap<String, String>,
}

impl OptionSubstitution {
    /// Resolve caller values against the declared options.
    pub fn resolve(
        declared: &BTreeMap<String, TemplateOption>,
        provided: &HashMap<String, String>,
    ) -> TemplateResult<Self> {
        let mut values = BTreeMap::new();

        for (name, option) in declared {
            let value = match provided.get(name) {
                Some(value) => option.coerce(value).map_err(|message| {
                    TemplateError::InvalidInput(format!("option '{}': {}", name, message))
                })?,
                None => {
                    debug!("Option '{}' not provided, using default", name);
                    option.default_text()
                }
            };
            values.insert(name.clone(), value);
        }

        let mut undeclared: Vec<_> = provided
            .keys()
            .filter(|name| !declared.contains_key(*name))
            .collect();
        undeclared.sort();
        for name in undeclared {
            warn!("Ignoring option '{}': the template does not declare it", name);
        }

        Ok(Self { values })
    }

    /// The resolved value table.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Replace every placeholder bound to a declared option.
    pub fn substitute_text<'a>(&self, content: &'a str) -> Cow<'a, str> {
        let mut rest = content;
        let mut out: Option<String> = None;

        while let Some(start) = rest.find(TOKEN_PREFIX) {
            let after = &rest[start + TOKEN_PREFIX.len()..];
            let Some(end) = after.find(TOKEN_SUFFIX) else {
                break;
            };

            let name = after[..end].trim_matches(|c: char| c.is_ascii_whitespace());
            let buf = out.get_or_insert_with(|| String::with_capacity(content.len()));
            match self.values.get(name) {
                Some(value) => {
                    buf.push_str(&rest[..start]);
                    buf.push_str(value);
                    rest = &after[end + TOKEN_SUFFIX.len_utf8()..];
                }
                None => {
                    buf.push_str(&rest[..start + TOKEN_PREFIX.len()]);
                    rest = after;
                }
            }
        }

        match out {
            Some(mut buf) => {
                buf.push_str(rest);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(content),
        }
    }

    /// Substitute a file's bytes; binary content is returned untouched.
    pub fn substitute_bytes(&self, bytes: Vec<u8>) -> Vec<u8> {
        if !is_text(&bytes) {
            return bytes;
        }
        match String::from_utf8(bytes) {
            Ok(text) => {
                let replaced = match self.substitute_text(&text) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(replaced) => Some(replaced),
                };
                replaced.unwrap_or(text).into_bytes()
            }
            Err(e) => e.into_bytes(),
        }
    }
}

/// Content-based text detection: valid UTF-8 with no NUL bytes.
pub fn is_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::OptionType;
    use serde_json::Value;

    fn option(option_type: OptionType, default: Value) -> TemplateOption {
        TemplateOption {
            option_type,
            description: None,
            default,
            enum_values: None,
            proposals: None,
        }
    }

    fn declared() -> BTreeMap<String, TemplateOption> {
        BTreeMap::from([
            ("installZsh".to_string(), option(OptionType::Boolean, Value::Bool(true))),
            (
                "dockerVersion".to_string(),
                option(OptionType::String, Value::String("latest".into())),
            ),
        ])
    }

    fn provided(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let subst = OptionSubstitution::resolve(&declared(), &HashMap::new()).unwrap();
        assert_eq!(subst.values()["installZsh"], "true");
        assert_eq!(subst.values()["dockerVersion"], "latest");
    }

    #[test]
    fn test_provided_values_are_coerced() {
        let subst =
            OptionSubstitution::resolve(&declared(), &provided(&[("installZsh", "False")])).unwrap();
        assert_eq!(subst.values()["installZsh"], "false");
    }

    #[test]
    fn test_invalid_boolean_is_rejected() {
        let err = OptionSubstitution::resolve(&declared(), &provided(&[("installZsh", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
    }

    #[test]
    fn test_undeclared_values_are_ignored() {
        let subst =
            OptionSubstitution::resolve(&declared(), &provided(&[("other", "x")])).unwrap();
        assert!(!subst.values().contains_key("other"));
    }

    #[test]
    fn test_substitute_text() {
        let subst = OptionSubstitution::resolve(
            &declared(),
            &provided(&[("dockerVersion", "20.10"), ("installZsh", "false")]),
        )
        .unwrap();
        let content = "\"version\": \"${templateOption:dockerVersion}\",\r\n\"zsh\": \"${templateOption: installZsh }\"";
        assert_eq!(
            subst.substitute_text(content),
            "\"version\": \"20.10\",\r\n\"zsh\": \"false\""
        );
    }

    #[test]
    fn test_undeclared_tokens_stay_literal() {
        let subst = OptionSubstitution::resolve(&declared(), &HashMap::new()).unwrap();
        let content = "${templateOption:unknown} and ${templateOption:dockerVersion}";
        assert_eq!(
            subst.substitute_text(content),
            "${templateOption:unknown} and latest"
        );
    }

    #[test]
    fn test_unterminated_token_is_kept() {
        let subst = OptionSubstitution::resolve(&declared(), &HashMap::new()).unwrap();
        let content = "x ${templateOption:dockerVersion";
        assert!(matches!(subst.substitute_text(content), Cow::Borrowed(_)));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let declared = BTreeMap::from([
            ("a".to_string(), option(OptionType::String, Value::String("x".into()))),
            ("b".to_string(), option(OptionType::String, Value::String("y".into()))),
        ]);
        let subst = OptionSubstitution::resolve(
            &declared,
            &provided(&[("a", "${templateOption:b}")]),
        )
        .unwrap();
        assert_eq!(subst.substitute_text("${templateOption:a}"), "${templateOption:b}");
    }

    #[test]
    fn test_binary_content_untouched() {
        let subst = OptionSubstitution::resolve(&declared(), &HashMap::new()).unwrap();
        let mut bytes = b"${templateOption:dockerVersion}".to_vec();
        bytes.push(0);
        assert_eq!(subst.substitute_bytes(bytes.clone()), bytes);

        let invalid_utf8 = vec![0xff, 0xfe, b'$'];
        assert_eq!(subst.substitute_bytes(invalid_utf8.clone()), invalid_utf8);
    }

    #[test]
    fn test_bom_is_preserved() {
        let subst = OptionSubstitution::resolve(&declared(), &HashMap::new()).unwrap();
        let bytes = "\u{feff}v=${templateOption:dockerVersion}\n".as_bytes().to_vec();
        assert_eq!(
            subst.substitute_bytes(bytes),
            "\u{feff}v=latest\n".as_bytes().to_vec()
        );
    }
}
