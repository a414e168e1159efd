//! # dctk_templates
//!
//! Packaging and application of dev container templates.
//!
//! A template is a folder holding a `devcontainer-template.json` manifest and
//! the files of a dev container definition (an image reference, a Dockerfile
//! or a compose file). This crate:
//!
//! - Classifies templates and collects the Features they reference
//! - Packages a folder of templates into `devcontainer-template-<id>.tgz`
//!   archives plus a `devcontainer-collection.json` manifest
//! - Applies one template into a workspace, substituting
//!   `${templateOption:name}` placeholders and merging extra Features
//!
//! ## Example
//!
//! ```rust,no_run
//! use dctk_templates::{
//!     ApplyRequest, FeatureRequest, PackageOptions, Packager, TemplateApplier, DirectorySource,
//! };
//!
//! // Package every template under ./src
//! let report = Packager::new("src", "output")
//!     .with_options(PackageOptions::new().force_clean(true))
//!     .package()
//!     .unwrap();
//! println!("{} templates packaged", report.collection.templates.len());
//!
//! // Apply one of them into a workspace
//! let request = ApplyRequest::new()
//!     .with_option("installZsh", "false")
//!     .with_feature(FeatureRequest::new("ghcr.io/devcontainers/features/azure-cli:1"));
//! let result = TemplateApplier::new("my-project")
//!     .apply(&DirectorySource::new("src/docker-from-docker"), &request)
//!     .unwrap();
//! println!("{:?}", result.files);
//! ```

pub mod apply;
pub mod archiver;
pub mod classifier;
pub mod collection;
pub mod document;
pub mod error;
pub mod features;
pub mod ledger;
pub mod manifest;
pub mod merge;
pub mod packager;
pub mod source;
pub mod substitution;
pub mod tree;

pub use apply::{ApplyRequest, ApplyResult, TemplateApplier};
pub use archiver::{archive_name, Archiver};
pub use classifier::{classify, TemplateType};
pub use collection::{CollectionBuilder, CollectionMetadata, Template, COLLECTION_FILE};
pub use error::{TemplateError, TemplateResult};
pub use features::{normalize_feature_id, scan_feature_ids};
pub use ledger::{ApplyLedger, LEDGER_FILE};
pub use manifest::{
    LoadedManifest, ManifestReader, OptionType, TemplateManifest, TemplateOption, MANIFEST_FILE,
};
pub use merge::{merge_features, FeatureRequest, MergeOutcome};
pub use packager::{
    inspect_template, PackageFailure, PackageOptions, PackageReport, Packager, PackagingMode,
};
pub use source::{
    resolve_reference, ArchiveSource, DirectorySource, LocalTemplate, TemplateSource,
};
pub use substitution::OptionSubstitution;
