//! Inspect command - Show the collection entry of one template.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use dctk_templates::inspect_template;

#[derive(Args)]
pub struct InspectArgs {
    /// Template folder
    #[arg(default_value = ".")]
    template: PathBuf,
}

pub async fn execute(args: InspectArgs) -> Result<()> {
    if !args.template.is_dir() {
        anyhow::bail!(dctk_templates::TemplateError::InvalidInput(format!(
            "Template folder not found: {}",
            args.template.display()
        )));
    }

    let (_, template) = inspect_template(&args.template, None)
        .with_context(|| format!("Failed to inspect {}", args.template.display()))?;

    println!("{}", serde_json::to_string_pretty(&template)?);
    Ok(())
}
