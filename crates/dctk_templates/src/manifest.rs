//! Template manifest definitions and loading.
//!
//! A template describes itself through a `devcontainer-template.json` file at
//! its root. The file is optional: a folder without one gets a minimal
//! manifest whose id is the folder name.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::kind;
use crate::error::{TemplateError, TemplateResult};

/// File name of the per-template manifest.
pub const MANIFEST_FILE: &str = "devcontainer-template.json";

/// Declared type of a template option.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    String,
    Boolean,
}

/// Option schema declared by a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateOption {
    #[serde(rename = "type")]
    pub option_type: OptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Value,
    /// Closed set of accepted values
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Suggested values; any string is still accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposals: Option<Vec<String>>,
}

impl TemplateOption {
    /// Check that the default matches the declared type.
    fn validate(&self, name: &str) -> Result<(), String> {
        match (self.option_type, &self.default) {
            (OptionType::Boolean, Value::Bool(_)) => {}
            (OptionType::String, Value::String(default)) => {
                if let Some(values) = &self.enum_values {
                    if !values.iter().any(|v| v == default) {
                        return Err(format!(
                            "option '{}' default '{}' is not one of its enum values",
                            name, default
                        ));
                    }
                }
            }
            (OptionType::Boolean, Value::Null) | (OptionType::String, Value::Null) => {
                return Err(format!("option '{}' declares no default", name));
            }
            (option_type, other) => {
                return Err(format!(
                    "option '{}' is of type {:?} but its default is a {}",
                    name,
                    option_type,
                    kind(other)
                ));
            }
        }

        if self.option_type == OptionType::Boolean && self.enum_values.is_some() {
            return Err(format!("boolean option '{}' cannot declare enum values", name));
        }

        Ok(())
    }

    /// The default rendered as substitution text.
    pub fn default_text(&self) -> String {
        match &self.default {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Coerce a caller-supplied value to the option's type.
    pub fn coerce(&self, value: &str) -> Result<String, String> {
        match self.option_type {
            OptionType::Boolean => match value.trim().to_ascii_lowercase().as_str() {
                "true" => Ok("true".to_string()),
                "false" => Ok("false".to_string()),
                _ => Err(format!("expected 'true' or 'false', got '{}'", value)),
            },
            OptionType::String => match &self.enum_values {
                Some(values) if !values.iter().any(|v| v == value) => Err(format!(
                    "'{}' is not one of: {}",
                    value,
                    values.join(", ")
                )),
                _ => Ok(value.to_string()),
            },
        }
    }
}

/// Contents of a `devcontainer-template.json` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "documentationURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub documentation_url: Option<String>,
    #[serde(default, rename = "licenseURL", skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, TemplateOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    /// Paths a caller may ask to leave out when applying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_paths: Option<Vec<String>>,
    /// Any other properties, passed through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemplateManifest {
    /// Minimal manifest for a folder that ships none.
    pub fn implied(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Declared options, empty when the manifest declares none.
    pub fn options(&self) -> BTreeMap<String, TemplateOption> {
        self.options.clone().unwrap_or_default()
    }

    /// Validate structure that serde cannot express.
    pub fn validate(&self, template: &str) -> TemplateResult<()> {
        if let Some(id) = &self.id {
            validate_id(id).map_err(|message| TemplateError::invalid_manifest(template, message))?;
        }

        if let Some(options) = &self.options {
            for (name, option) in options {
                if name.trim().is_empty() {
                    return Err(TemplateError::invalid_manifest(
                        template,
                        "option names must not be empty",
                    ));
                }
                option
                    .validate(name)
                    .map_err(|message| TemplateError::invalid_manifest(template, message))?;
            }
        }

        Ok(())
    }
}

/// Check that an id is usable as a folder and archive name.
pub fn validate_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("id must not be empty".to_string());
    }
    if id.contains('/') || id.contains('\\') {
        return Err(format!("id '{}' must not contain path separators", id));
    }
    if id == "." || id == ".." {
        return Err(format!("id '{}' is not a valid name", id));
    }
    Ok(())
}

/// A manifest together with the identity it resolves to.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// Template id: the manifest id when declared, else the folder name
    pub id: String,
    pub manifest: TemplateManifest,
    /// Whether the manifest was implied rather than read from disk
    pub synthesized: bool,
}

impl LoadedManifest {
    /// Manifest bytes to ship for a template without its own manifest file.
    pub fn synthesized_bytes(&self) -> TemplateResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&self.manifest)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Reader for template manifests.
pub struct ManifestReader;

impl ManifestReader {
    /// Read and validate the manifest of a template folder.
    pub fn read(template_dir: &Path) -> TemplateResult<LoadedManifest> {
        let folder_name = folder_name(template_dir)?;
        let manifest_path = template_dir.join(MANIFEST_FILE);

        if !manifest_path.is_file() {
            debug!("No manifest in {:?}, using folder name '{}'", template_dir, folder_name);
            validate_id(&folder_name)
                .map_err(|message| TemplateError::invalid_manifest(&folder_name, message))?;
            return Ok(LoadedManifest {
                manifest: TemplateManifest::implied(&folder_name),
                id: folder_name,
                synthesized: true,
            });
        }

        debug!("Loading manifest from {:?}", manifest_path);
        let content = fs::read_to_string(&manifest_path)?;
        let manifest = Self::parse(&content, &folder_name)?;

        let id = manifest.id.clone().unwrap_or_else(|| folder_name.clone());
        if id != folder_name {
            warn!(
                "Template id '{}' does not match its folder name '{}'",
                id, folder_name
            );
        }

        Ok(LoadedManifest {
            id,
            manifest,
            synthesized: false,
        })
    }

    /// Parse and validate manifest content.
    pub fn parse(content: &str, template: &str) -> TemplateResult<TemplateManifest> {
        let manifest: TemplateManifest = serde_json::from_str(content)
            .map_err(|e| TemplateError::invalid_manifest(template, e.to_string()))?;
        manifest.validate(template)?;
        Ok(manifest)
    }
}

pub(crate) fn folder_name(path: &Path) -> TemplateResult<String> {
    let resolved = if path.file_name().is_some() {
        path.to_path_buf()
    } else {
        path.canonicalize()?
    };
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| TemplateError::InvalidInput(format!("{:?} has no folder name", path)))
}
