//! Merging caller-requested Features into a devcontainer configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::{features_map, features_map_mut};
use crate::error::{TemplateError, TemplateResult};
use crate::features::normalize_feature_id;

/// A Feature the caller wants added to the applied template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRequest {
    /// Full Feature reference, version tag included
    pub id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl FeatureRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// References appended to the Feature map, in request order
    pub added: Vec<String>,
    /// References dropped because the template already declares the Feature
    pub skipped: Vec<String>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Add requested Features the document does not already declare.
///
/// Template entries are never modified: a request whose normalized id is
/// already present is dropped along with its options. New entries are
/// appended after the existing ones, in request order.
pub fn merge_features(document: &mut Value, requests: &[FeatureRequest]) -> TemplateResult<MergeOutcome> {
    let mut present: HashSet<String> = features_map(document)?
        .map(|features| {
            features
                .keys()
                .map(|key| normalize_feature_id(key).to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut outcome = MergeOutcome::default();
    let mut additions = Vec::new();

    for request in requests {
        let reference = request.id.trim();
        let id = normalize_feature_id(reference);
        if id.is_empty() {
            return Err(TemplateError::InvalidInput(
                "Feature reference must not be empty".to_string(),
            ));
        }

        if present.insert(id.to_string()) {
            additions.push((reference.to_string(), Value::Object(request.options.clone())));
            outcome.added.push(reference.to_string());
        } else {
            debug!("Feature '{}' already declared by the template, keeping its entry", id);
            outcome.skipped.push(reference.to_string());
        }
    }

    if !additions.is_empty() {
        let features = features_map_mut(document)?;
        for (reference, options) in additions {
            features.insert(reference, options);
        }
    }

    Ok(outcome)
}
