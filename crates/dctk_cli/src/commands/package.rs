//! Package command - Archive templates and write the collection manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use dctk_templates::{PackageOptions, Packager, PackagingMode};

#[derive(Args)]
pub struct PackageArgs {
    /// Template folder, or folder of templates
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Where archives and devcontainer-collection.json are written
    #[arg(short, long, default_value = "./output", env = "DCTK_OUTPUT_DIR")]
    output_folder: PathBuf,

    /// Delete the output folder before packaging
    #[arg(short, long = "force-clean-output-folder")]
    force_clean: bool,

    /// Replace archives left by an earlier run
    #[arg(long)]
    overwrite: bool,

    /// Package templates one at a time
    #[arg(long)]
    sequential: bool,
}

pub async fn execute(args: PackageArgs) -> Result<()> {
    info!(
        "Packaging {} into {}",
        args.target.display(),
        args.output_folder.display()
    );

    let options = PackageOptions::new()
        .force_clean(args.force_clean)
        .overwrite(args.overwrite)
        .sequential(args.sequential);
    let packager = Packager::new(&args.target, &args.output_folder).with_options(options);

    let report = tokio::task::spawn_blocking(move || packager.package())
        .await
        .context("Packaging task failed")?
        .with_context(|| format!("Failed to package {}", args.target.display()))?;

    for failure in &report.failures {
        warn!("Skipped '{}': {}", failure.template, failure.error);
    }

    let mode = match report.mode {
        PackagingMode::SingleTemplate => "template",
        PackagingMode::Collection => "collection",
    };
    info!(
        "Packaged {} {} archive(s), {} failure(s); collection at {}",
        mode,
        report.archives.len(),
        report.failures.len(),
        report.collection_path.display()
    );

    print!("{}", report.collection.to_json()?);
    Ok(())
}
