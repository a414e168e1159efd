//! Apply command - Materialize a template into a workspace folder.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use dctk_templates::{
    resolve_reference, ApplyRequest, FeatureRequest, TemplateApplier, TemplateError,
};

#[derive(Args)]
pub struct ApplyArgs {
    /// Workspace folder to write the template into
    #[arg(short, long, default_value = ".")]
    workspace_folder: PathBuf,

    /// Template folder, .tgz archive, or template id
    #[arg(short, long)]
    template_id: String,

    /// Option values as a JSON object, e.g. '{"installZsh":"false"}'
    #[arg(short = 'a', long, default_value = "{}")]
    template_args: String,

    /// Extra Features as a JSON array, e.g. '[{"id":"ghcr.io/x/y:1","options":{}}]'
    #[arg(long, default_value = "[]")]
    features: String,

    /// Optional paths to leave out, as a JSON array
    #[arg(long, default_value = "[]")]
    omit_paths: String,

    /// Folder searched for packaged templates when the id is not a path
    #[arg(long, env = "DCTK_TEMPLATES_DIR")]
    templates_dir: Option<PathBuf>,

    /// Replace workspace files that differ from the template output
    #[arg(long)]
    overwrite: bool,
}

pub async fn execute(args: ApplyArgs) -> Result<()> {
    let options = parse_template_args(&args.template_args)?;
    let features: Vec<FeatureRequest> = parse_json_arg("--features", &args.features)?;
    let omit_paths: Vec<String> = parse_json_arg("--omit-paths", &args.omit_paths)?;

    let mut request = ApplyRequest::new()
        .with_options(options)
        .with_features(features)
        .overwrite(args.overwrite);
    for path in omit_paths {
        request = request.omit(path);
    }

    let template_id = args.template_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        let source = resolve_reference(&args.template_id, args.templates_dir.as_deref())?;
        info!(
            "Applying {} to {}",
            source.describe(),
            args.workspace_folder.display()
        );
        TemplateApplier::new(&args.workspace_folder).apply(source.as_ref(), &request)
    })
    .await
    .context("Apply task failed")?
    .with_context(|| format!("Failed to apply template '{}'", template_id))?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn parse_json_arg<T: DeserializeOwned>(flag: &str, raw: &str) -> Result<T, TemplateError> {
    serde_json::from_str(raw)
        .map_err(|e| TemplateError::InvalidInput(format!("{} is not valid JSON: {}", flag, e)))
}

/// Option values are strings; JSON booleans are accepted as their text.
fn parse_template_args(raw: &str) -> Result<HashMap<String, String>, TemplateError> {
    let values: HashMap<String, Value> = parse_json_arg("--template-args", raw)?;
    values
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            Value::Bool(b) => Ok((name, b.to_string())),
            other => Err(TemplateError::InvalidInput(format!(
                "--template-args value for '{}' must be a string, got {}",
                name, other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_args() {
        let values = parse_template_args(r#"{"installZsh": "false", "upgrade": true}"#).unwrap();
        assert_eq!(values["installZsh"], "false");
        assert_eq!(values["upgrade"], "true");
    }

    #[test]
    fn test_parse_template_args_rejects_numbers() {
        let err = parse_template_args(r#"{"count": 3}"#).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_features() {
        let features: Vec<FeatureRequest> = parse_json_arg(
            "--features",
            r#"[{"id": "ghcr.io/devcontainers/features/azure-cli:1", "options": {"version": "latest"}}]"#,
        )
        .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, "ghcr.io/devcontainers/features/azure-cli:1");
        assert_eq!(features[0].options["version"], "latest");
    }

    #[test]
    fn test_invalid_json_is_invalid_input() {
        let err = parse_json_arg::<Vec<String>>("--omit-paths", "[oops").unwrap_err();
        assert!(err.to_string().contains("--omit-paths"));
    }
}
