//! Packaging of template folders into archives plus a collection manifest.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, info, warn};

use crate::archiver::Archiver;
use crate::classifier::{classify, config_file, is_template_dir};
use crate::collection::{CollectionBuilder, CollectionMetadata, Template};
use crate::error::{TemplateError, TemplateResult};
use crate::features::scan_config_file;
use crate::manifest::{folder_name, LoadedManifest, ManifestReader};
use crate::tree;

/// Whether the source folder is one template or a folder of templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingMode {
    SingleTemplate,
    Collection,
}

/// Options for a packaging run.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Delete the output folder before writing
    pub force_clean: bool,
    /// Replace archives left by an earlier run
    pub overwrite: bool,
    /// Process templates sequentially
    pub sequential: bool,
}

impl PackageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_clean(mut self, force_clean: bool) -> Self {
        self.force_clean = force_clean;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }
}

/// A template that could not be packaged.
#[derive(Debug)]
pub struct PackageFailure {
    /// Folder name of the template
    pub template: String,
    pub path: PathBuf,
    pub error: TemplateError,
}

/// Outcome of a packaging run.
#[derive(Debug)]
pub struct PackageReport {
    pub mode: PackagingMode,
    pub collection: CollectionMetadata,
    /// Path of the written collection manifest
    pub collection_path: PathBuf,
    /// Archives written, in collection order
    pub archives: Vec<PathBuf>,
    pub failures: Vec<PackageFailure>,
}

/// Compute the collection entry of one template without archiving it.
pub fn inspect_template(
    template_dir: &Path,
    exclude: Option<&Path>,
) -> TemplateResult<(LoadedManifest, Template)> {
    let loaded = ManifestReader::read(template_dir)?;
    let template_type = classify(template_dir);

    let feature_ids = match config_file(template_dir) {
        Some(path) => scan_config_file(&path).map_err(|e| {
            TemplateError::invalid_manifest(
                &loaded.id,
                format!("cannot read {}: {}", tree::to_slash(&path), e),
            )
        })?,
        None => BTreeSet::new(),
    };

    let file_count = tree::count_files(template_dir, exclude)?;
    let template = Template::new(&loaded, template_type, file_count, feature_ids);

    debug!(
        "Template '{}': type={}, files={}, features={}",
        template.id,
        template.template_type,
        template.file_count,
        template.feature_ids.len()
    );
    Ok((loaded, template))
}

/// Packages a template source folder.
pub struct Packager {
    source_dir: PathBuf,
    output_dir: PathBuf,
    options: PackageOptions,
}

impl Packager {
    /// Create a packager for `source_dir` writing into `output_dir`.
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            options: PackageOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    /// Decide how a source folder is packaged.
    pub fn detect_mode(source_dir: &Path) -> PackagingMode {
        if is_template_dir(source_dir) {
            PackagingMode::SingleTemplate
        } else {
            PackagingMode::Collection
        }
    }

    /// Package every template and write the collection manifest.
    pub fn package(&self) -> TemplateResult<PackageReport> {
        if !self.source_dir.is_dir() {
            return Err(TemplateError::InvalidInput(format!(
                "Source folder does not exist: {}",
                self.source_dir.display()
            )));
        }

        self.prepare_output()?;

        let mode = Self::detect_mode(&self.source_dir);
        let candidates = self.candidates(mode)?;
        if candidates.is_empty() {
            return Err(TemplateError::InvalidInput(format!(
                "No templates found in {}",
                self.source_dir.display()
            )));
        }

        info!(
            "Packaging {} template(s) from {:?} ({:?} mode)",
            candidates.len(),
            self.source_dir,
            mode
        );

        let mut failures = Vec::new();

        // Ids are settled before archiving; a duplicate loses to the folder
        // that sorts first.
        let inspected = self.run_all(&candidates, |dir| {
            inspect_template(dir, Some(&self.output_dir))
        });
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for (path, result) in candidates.into_iter().zip(inspected) {
            match result {
                Ok((_, template)) if !seen.insert(template.id.clone()) => {
                    let error = TemplateError::invalid_manifest(
                        &template.id,
                        format!("duplicate id '{}' in collection", template.id),
                    );
                    failures.push(Self::failure(path, error));
                }
                Ok((loaded, template)) => accepted.push((path, loaded, template)),
                Err(error) => failures.push(Self::failure(path, error)),
            }
        }

        let archiver = Archiver::new(&self.output_dir).overwrite(self.options.overwrite);
        let archived = self.run_all(&accepted, |(dir, loaded, _)| archiver.archive(dir, loaded));

        let mut builder = CollectionBuilder::new();
        let mut archives = Vec::new();
        for ((path, _, template), result) in accepted.into_iter().zip(archived) {
            match result {
                Ok(archive) => {
                    info!("Packaged template '{}' -> {:?}", template.id, archive);
                    builder.push(template);
                    archives.push(archive);
                }
                Err(error) => failures.push(Self::failure(path, error)),
            }
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        if builder.is_empty() {
            return Err(match (mode, failures.pop()) {
                (PackagingMode::SingleTemplate, Some(failure)) => failure.error,
                _ => TemplateError::InvalidInput(format!(
                    "None of the templates in {} could be packaged",
                    self.source_dir.display()
                )),
            });
        }

        let packaged = builder.len();
        let collection = builder.build();
        let collection_path = collection.write(&self.output_dir)?;

        info!(
            "Wrote {} template(s) to {:?} ({} failed)",
            packaged,
            self.output_dir,
            failures.len()
        );

        Ok(PackageReport {
            mode,
            collection,
            collection_path,
            archives,
            failures,
        })
    }

    fn failure(path: PathBuf, error: TemplateError) -> PackageFailure {
        let template = folder_name(&path).unwrap_or_else(|_| path.display().to_string());
        warn!("Skipping template '{}': {}", template, error);
        PackageFailure {
            template,
            path,
            error,
        }
    }

    /// Create (and optionally clear) the output folder.
    fn prepare_output(&self) -> TemplateResult<()> {
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(TemplateError::InvalidInput(format!(
                "Output path is not a folder: {}",
                self.output_dir.display()
            )));
        }

        if self.options.force_clean && self.output_dir.exists() {
            let output = self.output_dir.canonicalize()?;
            let source = self.source_dir.canonicalize()?;
            if source.starts_with(&output) {
                return Err(TemplateError::InvalidInput(format!(
                    "Refusing to clean {}: it contains the source folder",
                    self.output_dir.display()
                )));
            }
            debug!("Cleaning output folder {:?}", self.output_dir);
            fs::remove_dir_all(&self.output_dir)?;
        }

        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Template folders to process, in discovery order.
    fn candidates(&self, mode: PackagingMode) -> TemplateResult<Vec<PathBuf>> {
        if mode == PackagingMode::SingleTemplate {
            return Ok(vec![self.source_dir.clone()]);
        }

        let output = self.output_dir.canonicalize().ok();
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.source_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                debug!("Ignoring hidden folder {:?}", path);
                continue;
            }
            if output.is_some() && path.canonicalize().ok() == output {
                continue;
            }
            dirs.push(path);
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Run `work` over every item, preserving item order in the results.
    fn run_all<I, T, F>(&self, items: &[I], work: F) -> Vec<TemplateResult<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> TemplateResult<T> + Sync,
    {
        if self.options.sequential || items.len() <= 1 {
            return items.iter().map(&work).collect();
        }

        let workers = thread::available_parallelism().map_or(4, |n| n.get());
        let mut results = Vec::with_capacity(items.len());

        for chunk in items.chunks(workers) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|item| scope.spawn(|| work(item)))
                    .collect();

                for handle in handles {
                    results.push(handle.join().unwrap_or_else(|_| {
                        Err(TemplateError::InvalidInput(
                            "Packaging worker panicked".to_string(),
                        ))
                    }));
                }
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_detect_mode() {
        let temp = tempdir().unwrap();
        write(temp.path(), "alpine/.devcontainer.json", "{}");
        assert_eq!(Packager::detect_mode(temp.path()), PackagingMode::Collection);
        assert_eq!(
            Packager::detect_mode(&temp.path().join("alpine")),
            PackagingMode::SingleTemplate
        );
    }

    #[test]
    fn test_missing_source_is_invalid_input() {
        let temp = tempdir().unwrap();
        let err = Packager::new(temp.path().join("missing"), temp.path().join("out"))
            .package()
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_output_path_is_a_file() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/alpine/.devcontainer.json", "{}");
        write(temp.path(), "out", "");
        let err = Packager::new(temp.path().join("src"), temp.path().join("out"))
            .package()
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_template_is_skipped() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/good/.devcontainer.json", "{}");
        write(temp.path(), "src/bad/.devcontainer.json", "{}");
        write(temp.path(), "src/bad/devcontainer-template.json", "{ nope");

        let report = Packager::new(temp.path().join("src"), temp.path().join("out"))
            .package()
            .unwrap();

        assert_eq!(report.collection.templates.len(), 1);
        assert_eq!(report.collection.templates[0].id, "good");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].template, "bad");
        assert!(matches!(
            report.failures[0].error,
            TemplateError::InvalidManifest { .. }
        ));
        assert!(!temp.path().join("out/devcontainer-template-bad.tgz").exists());
    }

    #[test]
    fn test_single_template_failure_is_fatal() {
        let temp = tempdir().unwrap();
        write(temp.path(), "bad/devcontainer-template.json", "[]");
        let err = Packager::new(temp.path().join("bad"), temp.path().join("out"))
            .package()
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidManifest { .. }));
    }

    #[test]
    fn test_force_clean_refuses_source_inside_output() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/alpine/.devcontainer.json", "{}");
        let err = Packager::new(temp.path().join("src"), temp.path())
            .with_options(PackageOptions::new().force_clean(true))
            .package()
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
        assert!(temp.path().join("src/alpine/.devcontainer.json").exists());
    }

    #[test]
    fn test_output_inside_source_is_not_a_template() {
        let temp = tempdir().unwrap();
        write(temp.path(), "alpine/.devcontainer.json", "{}");
        let out = temp.path().join("output");

        let packager = Packager::new(temp.path(), &out);
        packager.package().unwrap();
        let report = Packager::new(temp.path(), &out)
            .with_options(PackageOptions::new().overwrite(true))
            .package()
            .unwrap();

        assert_eq!(report.collection.templates.len(), 1);
        assert_eq!(report.collection.templates[0].file_count, 1);
    }

    #[test]
    fn test_duplicate_id_keeps_first_folder() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/a/devcontainer-template.json", r#"{ "id": "same" }"#);
        write(temp.path(), "src/a/.devcontainer.json", r#"{ "image": "a" }"#);
        write(temp.path(), "src/b/devcontainer-template.json", r#"{ "id": "same" }"#);
        write(temp.path(), "src/b/.devcontainer.json", r#"{ "image": "b" }"#);
        write(temp.path(), "src/c/.devcontainer.json", "{}");

        for sequential in [true, false] {
            let report = Packager::new(temp.path().join("src"), temp.path().join("out"))
                .with_options(
                    PackageOptions::new()
                        .force_clean(true)
                        .overwrite(true)
                        .sequential(sequential),
                )
                .package()
                .unwrap();

            let ids: Vec<_> = report.collection.templates.iter().map(|t| t.id.as_str()).collect();
            assert_eq!(ids, vec!["same", "c"]);
            assert_eq!(report.archives.len(), 2);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].template, "b");
            assert!(matches!(
                report.failures[0].error,
                TemplateError::InvalidManifest { .. }
            ));
        }

        let archive = fs::File::open(temp.path().join("out/devcontainer-template-same.tgz")).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(archive));
        let mut config = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().to_string_lossy() == ".devcontainer.json" {
                std::io::Read::read_to_string(&mut entry, &mut config).unwrap();
            }
        }
        assert_eq!(config, r#"{ "image": "a" }"#);
    }
}
