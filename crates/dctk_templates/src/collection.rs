//! Collection metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::classifier::TemplateType;
use crate::error::{TemplateError, TemplateResult};
use crate::manifest::{LoadedManifest, TemplateOption};

/// File name of the collection manifest.
pub const COLLECTION_FILE: &str = "devcontainer-collection.json";

/// Value recorded as the collection's producer.
pub const SOURCE_NAME: &str = "dctk";

/// Properties computed during packaging; authors cannot set them.
const COMPUTED_KEYS: [&str; 3] = ["type", "fileCount", "featureIds"];

/// Metadata for one packaged template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
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
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    pub file_count: usize,
    pub feature_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, TemplateOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_paths: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    /// Assemble a record from a manifest and the computed properties.
    pub fn new(
        loaded: &LoadedManifest,
        template_type: TemplateType,
        file_count: usize,
        feature_ids: BTreeSet<String>,
    ) -> Self {
        let manifest = loaded.manifest.clone();
        let mut extra = manifest.extra;
        for key in COMPUTED_KEYS {
            extra.remove(key);
        }

        Self {
            id: loaded.id.clone(),
            version: manifest.version,
            name: manifest.name,
            description: manifest.description,
            documentation_url: manifest.documentation_url,
            license_url: manifest.license_url,
            publisher: manifest.publisher,
            keywords: manifest.keywords,
            template_type,
            file_count,
            feature_ids,
            options: manifest.options,
            platforms: manifest.platforms,
            optional_paths: manifest.optional_paths,
            extra,
        }
    }
}

/// Producer information recorded in the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceInformation {
    pub source: String,
}

impl Default for SourceInformation {
    fn default() -> Self {
        Self {
            source: SOURCE_NAME.to_string(),
        }
    }
}

/// Aggregate manifest for all templates of one packaging run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    #[serde(default)]
    pub source_information: SourceInformation,
    pub templates: Vec<Template>,
}

impl CollectionMetadata {
    /// Find a template by id.
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Serialize the collection document.
    pub fn to_json(&self) -> TemplateResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the collection document into `output_dir`, replacing any previous one.
    pub fn write(&self, output_dir: &Path) -> TemplateResult<PathBuf> {
        let target = output_dir.join(COLLECTION_FILE);
        let json = self.to_json()?;

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{}.", COLLECTION_FILE))
            .suffix(".partial")
            .tempfile_in(output_dir)?;
        staged.write_all(json.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&target)
            .map_err(|e| TemplateError::Io(e.error))?;

        debug!("Wrote collection metadata to {:?}", target);
        Ok(target)
    }

    /// Read a collection document.
    pub fn read(path: &Path) -> TemplateResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Accumulates template records in discovery order.
#[derive(Debug, Default)]
pub struct CollectionBuilder {
    templates: Vec<Template>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one template record.
    pub fn push(&mut self, template: Template) -> &mut Self {
        self.templates.push(template);
        self
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Finish the collection.
    pub fn build(self) -> CollectionMetadata {
        CollectionMetadata {
            source_information: SourceInformation::default(),
            templates: self.templates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestReader, TemplateManifest};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn loaded(manifest: TemplateManifest, id: &str) -> LoadedManifest {
        LoadedManifest {
            id: id.to_string(),
            manifest,
            synthesized: false,
        }
    }

    #[test]
    fn test_template_serialization_shape() {
        let manifest = ManifestReader::parse(
            r#"{ "id": "cpp", "version": "1.0.0", "name": "C++", "type": "image", "publisher": "me" }"#,
            "cpp",
        )
        .unwrap();
        let template = Template::new(
            &loaded(manifest, "cpp"),
            TemplateType::Dockerfile,
            3,
            BTreeSet::from(["ghcr.io/devcontainers/features/common-utils".to_string()]),
        );

        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "cpp",
                "version": "1.0.0",
                "name": "C++",
                "publisher": "me",
                "type": "dockerfile",
                "fileCount": 3,
                "featureIds": ["ghcr.io/devcontainers/features/common-utils"]
            })
        );
    }

    #[test]
    fn test_builder_keeps_order() {
        let mut builder = CollectionBuilder::new();
        for id in ["b", "a", "c"] {
            builder.push(Template::new(
                &loaded(TemplateManifest::implied(id), id),
                TemplateType::Image,
                1,
                BTreeSet::new(),
            ));
        }
        assert_eq!(builder.len(), 3);
        let collection = builder.build();
        let ids: Vec<_> = collection.templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(collection.get("a").is_some());
    }

    #[test]
    fn test_write_and_read_back() {
        let out = tempdir().unwrap();
        let mut builder = CollectionBuilder::new();
        builder.push(Template::new(
            &loaded(TemplateManifest::implied("alpine"), "alpine"),
            TemplateType::Image,
            2,
            BTreeSet::new(),
        ));
        let collection = builder.build();

        let path = collection.write(out.path()).unwrap();
        assert_eq!(path, out.path().join(COLLECTION_FILE));
        let read = CollectionMetadata::read(&path).unwrap();
        assert_eq!(read, collection);
        assert_eq!(read.source_information.source, "dctk");
    }
}
