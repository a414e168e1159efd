//! Applying a template into a workspace.
//!
//! Every output is staged in memory first: options are substituted, the
//! devcontainer configuration is checked to still parse, Features are merged
//! into it, and destinations are checked for conflicts before anything is
//! written. Files are then written one by one through a temporary file and an
//! atomic rename. If a write fails midway the files already renamed stay in
//! place; output is deterministic, so applying again with the same inputs is
//! safe.
//!
//! A destination that differs from the staged output is only replaced when it
//! still holds exactly what an earlier apply of the same template wrote (see
//! [`ApplyLedger`]) or when the caller asks for `overwrite`.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, Permissions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::config_file;
use crate::document::{parse_jsonc, to_pretty_string};
use crate::error::{TemplateError, TemplateResult};
use crate::ledger::ApplyLedger;
use crate::manifest::{LoadedManifest, ManifestReader, MANIFEST_FILE};
use crate::merge::{merge_features, FeatureRequest};
use crate::source::TemplateSource;
use crate::substitution::OptionSubstitution;
use crate::tree;

/// Template-root files that are never copied into a workspace.
pub const ALWAYS_OMITTED: [&str; 3] = [MANIFEST_FILE, "README.md", "NOTES.md"];

/// Caller input for one apply.
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// Option values by name
    pub options: HashMap<String, String>,
    /// Features to add, in order
    pub features: Vec<FeatureRequest>,
    /// Template paths to leave out (`path` or `dir/*`)
    pub omit_paths: Vec<String>,
    /// Replace destination files whose content differs
    pub overwrite: bool,
}

impl ApplyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_feature(mut self, feature: FeatureRequest) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_features(mut self, features: Vec<FeatureRequest>) -> Self {
        self.features.extend(features);
        self
    }

    pub fn omit(mut self, path: impl Into<String>) -> Self {
        self.omit_paths.push(path.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Files written by one apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResult {
    /// Workspace-relative, `/`-separated, sorted
    pub files: Vec<String>,
}

/// One output file ready to be written.
#[derive(Debug)]
struct StagedFile {
    relative: String,
    contents: Vec<u8>,
    permissions: Permissions,
}

/// Applies templates into a workspace folder.
pub struct TemplateApplier {
    workspace: PathBuf,
}

impl TemplateApplier {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Fetch a template from `source` and apply it.
    pub fn apply(&self, source: &dyn TemplateSource, request: &ApplyRequest) -> TemplateResult<ApplyResult> {
        info!("Applying template from {}", source.describe());
        let local = source.fetch()?;
        self.apply_dir(local.root(), request)
    }

    /// Apply a template folder that is already on disk.
    pub fn apply_dir(&self, template_root: &Path, request: &ApplyRequest) -> TemplateResult<ApplyResult> {
        if self.workspace.exists() && !self.workspace.is_dir() {
            return Err(TemplateError::InvalidInput(format!(
                "Workspace is not a folder: {}",
                self.workspace.display()
            )));
        }

        let loaded = ManifestReader::read(template_root)?;
        let omit = OmitRules::new(&loaded, &request.omit_paths)?;
        let substitution = OptionSubstitution::resolve(&loaded.manifest.options(), &request.options)?;

        let staged = self.stage(template_root, &loaded, &omit, &substitution, &request.features)?;
        let mut ledger = ApplyLedger::load(&self.workspace);
        self.check_conflicts(&staged, &ledger, &loaded.id, request.overwrite)?;

        let mut files = BTreeSet::new();
        for file in &staged {
            self.write(file)?;
            files.insert(file.relative.clone());
        }

        ledger.record(
            &loaded.id,
            staged
                .iter()
                .map(|file| (file.relative.as_str(), file.contents.as_slice())),
        );
        ledger.save(&self.workspace)?;

        info!(
            "Applied template '{}' to {:?} ({} files)",
            loaded.id,
            self.workspace,
            files.len()
        );

        Ok(ApplyResult {
            files: files.into_iter().collect(),
        })
    }

    /// Produce every output in memory.
    fn stage(
        &self,
        template_root: &Path,
        loaded: &LoadedManifest,
        omit: &OmitRules,
        substitution: &OptionSubstitution,
        features: &[FeatureRequest],
    ) -> TemplateResult<Vec<StagedFile>> {
        let config = config_file(template_root)
            .and_then(|path| path.strip_prefix(template_root).ok().map(tree::to_slash));

        if !features.is_empty() && config.is_none() {
            return Err(TemplateError::InvalidInput(format!(
                "Template '{}' has no devcontainer configuration to add Features to",
                loaded.id
            )));
        }

        let mut staged = Vec::new();
        for entry in tree::walk(template_root, None)? {
            if entry.is_dir {
                continue;
            }
            if omit.matches(&entry.relative) {
                debug!("Omitting {}", entry.relative);
                continue;
            }

            let metadata = fs::metadata(&entry.path)?;
            let raw = fs::read(&entry.path)?;
            let contents = if config.as_deref() == Some(entry.relative.as_str()) {
                stage_config(&raw, substitution, features, &loaded.id, &entry.relative)?
            } else {
                substitution.substitute_bytes(raw)
            };

            staged.push(StagedFile {
                relative: entry.relative,
                contents,
                permissions: metadata.permissions(),
            });
        }

        Ok(staged)
    }

    /// Fail before writing anything if a destination would be clobbered.
    fn check_conflicts(
        &self,
        staged: &[StagedFile],
        ledger: &ApplyLedger,
        template: &str,
        overwrite: bool,
    ) -> TemplateResult<()> {
        for file in staged {
            let destination = self.workspace.join(&file.relative);
            if !destination.exists() {
                continue;
            }
            if destination.is_dir() {
                return Err(TemplateError::ApplyConflict { path: destination });
            }
            if overwrite {
                continue;
            }

            let existing = fs::read(&destination)?;
            if existing == file.contents {
                continue;
            }
            if ledger.owns(template, &file.relative, &existing) {
                debug!("Replacing earlier output of '{}' at {}", template, file.relative);
                continue;
            }
            return Err(TemplateError::ApplyConflict { path: destination });
        }
        Ok(())
    }

    /// Write one file through a temporary sibling and a rename.
    fn write(&self, file: &StagedFile) -> TemplateResult<()> {
        let destination = self.workspace.join(&file.relative);
        let parent = destination.parent().unwrap_or(&self.workspace);
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".dctk-")
            .suffix(".partial")
            .tempfile_in(parent)?;
        staged.write_all(&file.contents)?;
        staged.as_file().sync_all()?;
        fs::set_permissions(staged.path(), file.permissions.clone())?;
        staged
            .persist(&destination)
            .map_err(|e| TemplateError::Io(e.error))?;

        debug!("Wrote {}", file.relative);
        Ok(())
    }
}

/// Substitute the devcontainer configuration, check that it still parses, and
/// merge Features into it. The document is re-serialized only when a Feature
/// was added.
fn stage_config(
    raw: &[u8],
    substitution: &OptionSubstitution,
    features: &[FeatureRequest],
    template: &str,
    relative: &str,
) -> TemplateResult<Vec<u8>> {
    let original = std::str::from_utf8(raw).map_err(|e| {
        TemplateError::invalid_manifest(template, format!("{} is not UTF-8: {}", relative, e))
    })?;
    let contents = substitution.substitute_text(original);

    let mut document = match parse_jsonc(&contents) {
        Ok(document) => document,
        Err(e) if parse_jsonc(original).is_err() => {
            return Err(TemplateError::invalid_manifest(
                template,
                format!("{} is not valid JSON: {}", relative, e),
            ));
        }
        Err(e) => {
            let suspects: Vec<String> = substitution
                .values()
                .iter()
                .filter(|(_, value)| value.chars().any(|c| c == '"' || c == '\\' || c.is_control()))
                .map(|(name, _)| format!("'{}'", name))
                .collect();
            let hint = if suspects.is_empty() {
                String::new()
            } else {
                format!(" (check option {})", suspects.join(", "))
            };
            return Err(TemplateError::InvalidInput(format!(
                "Option values break the JSON structure of {}{}: {}",
                relative, hint, e
            )));
        }
    };

    if !features.is_empty() {
        let outcome = merge_features(&mut document, features)?;
        if outcome.changed() {
            info!("Added Features to {}: {}", relative, outcome.added.join(", "));
            return Ok(to_pretty_string(&document)?.into_bytes());
        }
    }
    Ok(contents.into_owned().into_bytes())
}

/// Paths excluded from an apply.
struct OmitRules {
    patterns: Vec<String>,
}

impl OmitRules {
    fn new(loaded: &LoadedManifest, requested: &[String]) -> TemplateResult<Self> {
        let allowed: Vec<String> = loaded
            .manifest
            .optional_paths
            .iter()
            .flatten()
            .map(|p| normalize_omit(p))
            .collect();

        let mut patterns = Vec::new();
        for path in requested {
            let pattern = normalize_omit(path);
            if pattern.is_empty() {
                continue;
            }
            if !allowed.is_empty() && !allowed.contains(&pattern) {
                return Err(TemplateError::InvalidInput(format!(
                    "'{}' is not an optional path of template '{}' (allowed: {})",
                    path,
                    loaded.id,
                    allowed.join(", ")
                )));
            }
            patterns.push(pattern);
        }

        Ok(Self { patterns })
    }

    fn matches(&self, relative: &str) -> bool {
        if ALWAYS_OMITTED.contains(&relative) {
            return true;
        }
        self.patterns.iter().any(|pattern| match pattern.strip_suffix("/*") {
            Some(dir) => relative.starts_with(&format!("{}/", dir)),
            None => relative == pattern,
        })
    }
}

fn normalize_omit(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    trimmed.trim_start_matches("./").to_string()
}
