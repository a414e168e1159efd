//! Feature references in devcontainer configurations.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::document::{features_map, parse_jsonc};
use crate::error::TemplateResult;

/// Strip the version tag or digest from a Feature reference.
///
/// Only a `:` after the last `/` starts a tag, so registry ports survive:
/// `localhost:5000/features/go:1` normalizes to `localhost:5000/features/go`.
pub fn normalize_feature_id(reference: &str) -> &str {
    let reference = reference.trim();
    let without_digest = match reference.find('@') {
        Some(at) => &reference[..at],
        None => reference,
    };

    let name_start = without_digest.rfind('/').map_or(0, |slash| slash + 1);
    match without_digest[name_start..].find(':') {
        Some(colon) => &without_digest[..name_start + colon],
        None => without_digest,
    }
}

/// Collect the normalized Feature ids a configuration document references.
pub fn scan_feature_ids(document: &Value) -> TemplateResult<BTreeSet<String>> {
    let ids = features_map(document)?
        .map(|features| {
            features
                .keys()
                .map(|key| normalize_feature_id(key).to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Ok(ids)
}

/// Read a configuration file and collect its Feature ids.
pub fn scan_config_file(path: &Path) -> TemplateResult<BTreeSet<String>> {
    debug!("Scanning Feature references in {:?}", path);
    let content = fs::read_to_string(path)?;
    let document = parse_jsonc(&content)?;
    scan_feature_ids(&document)
}
