//! Resolving a template reference to a local folder.
//!
//! Fetching templates from a registry is left to other tools. What is
//! supported here is a template folder, a packaged archive, or a reference
//! looked up by name among the archives of a packaging output folder.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use tracing::debug;

use crate::archiver::{archive_name, ARCHIVE_EXTENSION};
use crate::error::{TemplateError, TemplateResult};
use crate::features::normalize_feature_id;

/// A template available on the local filesystem.
#[derive(Debug)]
pub struct LocalTemplate {
    root: PathBuf,
    // Keeps an extracted copy alive until the template is dropped.
    _extracted: Option<TempDir>,
}

impl LocalTemplate {
    /// Root folder of the template.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Something that can produce a local copy of a template.
pub trait TemplateSource {
    /// Human-readable description of the source, for logs.
    fn describe(&self) -> String;

    /// Materialize the template locally.
    fn fetch(&self) -> TemplateResult<LocalTemplate>;
}

/// A template folder used in place.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for DirectorySource {
    fn describe(&self) -> String {
        format!("folder {}", self.path.display())
    }

    fn fetch(&self) -> TemplateResult<LocalTemplate> {
        if !self.path.is_dir() {
            return Err(TemplateError::InvalidInput(format!(
                "Template folder does not exist: {}",
                self.path.display()
            )));
        }
        Ok(LocalTemplate {
            root: self.path.clone(),
            _extracted: None,
        })
    }
}

/// A packaged template archive, extracted into a temporary folder.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for ArchiveSource {
    fn describe(&self) -> String {
        format!("archive {}", self.path.display())
    }

    fn fetch(&self) -> TemplateResult<LocalTemplate> {
        let file = File::open(&self.path).map_err(|e| {
            TemplateError::InvalidInput(format!(
                "Cannot open template archive {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let extracted = tempfile::Builder::new().prefix("dctk-template-").tempdir()?;
        debug!("Extracting {:?} into {:?}", self.path, extracted.path());

        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.unpack(extracted.path())?;

        Ok(LocalTemplate {
            root: extracted.path().to_path_buf(),
            _extracted: Some(extracted),
        })
    }
}

/// Pick a source for a template reference.
///
/// `reference` may be a template folder, a `.tgz` archive, or an id such as
/// `ghcr.io/devcontainers/templates/alpine:latest`, which is looked up by its
/// last path segment in `templates_dir`.
pub fn resolve_reference(
    reference: &str,
    templates_dir: Option<&Path>,
) -> TemplateResult<Box<dyn TemplateSource>> {
    let path = Path::new(reference);
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::new(path)));
    }
    if path.is_file() && path.extension().map_or(false, |ext| ext == ARCHIVE_EXTENSION) {
        return Ok(Box::new(ArchiveSource::new(path)));
    }

    let name = template_name(reference);
    if let (Some(dir), false) = (templates_dir, name.is_empty()) {
        let archive = dir.join(archive_name(name));
        if archive.is_file() {
            return Ok(Box::new(ArchiveSource::new(archive)));
        }
        let folder = dir.join(name);
        if folder.is_dir() {
            return Ok(Box::new(DirectorySource::new(folder)));
        }
    }

    Err(TemplateError::InvalidInput(format!(
        "Cannot resolve template '{}' locally{}",
        reference,
        templates_dir
            .map(|dir| format!(" (searched {})", dir.display()))
            .unwrap_or_default()
    )))
}

/// Last path segment of a reference, without its tag.
pub fn template_name(reference: &str) -> &str {
    let id = normalize_feature_id(reference);
    id.rsplit('/').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_template_name() {
        assert_eq!(
            template_name("ghcr.io/devcontainers/templates/docker-from-docker:latest"),
            "docker-from-docker"
        );
        assert_eq!(template_name("alpine"), "alpine");
    }

    #[test]
    fn test_resolve_directory() {
        let temp = tempdir().unwrap();
        let source = resolve_reference(temp.path().to_str().unwrap(), None).unwrap();
        let local = source.fetch().unwrap();
        assert_eq!(local.root(), temp.path());
    }

    #[test]
    fn test_resolve_by_name_in_templates_dir() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("alpine")).unwrap();
        let source =
            resolve_reference("ghcr.io/devcontainers/templates/alpine:3", Some(temp.path())).unwrap();
        assert!(source.describe().contains("alpine"));
    }

    #[test]
    fn test_unresolvable_reference() {
        let temp = tempdir().unwrap();
        let err = resolve_reference("ghcr.io/x/missing:1", Some(temp.path())).err().unwrap();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
    }
}
